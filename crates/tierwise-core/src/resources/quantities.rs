use crate::error::QuantityError;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * 1024 * 1024;

static MEMORY_WITH_UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)([KkMmGg][Ii])$").expect("memory quantity pattern is valid")
});

/// A CPU/memory pair.
///
/// The derived ordering compares `cpu_millicores` first and `memory_bytes`
/// second, which is the lexicographic `(cpu, memory)` order used to sort
/// tiers, nodes and workflow resource asks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceQuantities {
    /// CPU in millicores (1000 = 1 core)
    pub cpu_millicores: u64,
    /// Memory in bytes
    pub memory_bytes: u64,
}

impl ResourceQuantities {
    pub fn new(cpu_millicores: u64, memory_bytes: u64) -> Self {
        Self {
            cpu_millicores,
            memory_bytes,
        }
    }

    /// True when `self` is at least `other` on both dimensions
    pub fn dominates(&self, other: &ResourceQuantities) -> bool {
        self.cpu_millicores >= other.cpu_millicores && self.memory_bytes >= other.memory_bytes
    }

    /// Parse CPU string (e.g., "2", "1000m", "0.5") into millicores
    pub fn parse_cpu(s: &str) -> Result<u64, QuantityError> {
        let s = s.trim();
        if let Some(m) = s.strip_suffix('m') {
            // Millicores
            m.parse::<u64>()
                .map_err(|_| QuantityError::invalid_cpu(s))
        } else if let Ok(cores) = s.parse::<f64>() {
            cores_to_millicores(cores).ok_or_else(|| QuantityError::invalid_cpu(s))
        } else {
            Err(QuantityError::invalid_cpu(s))
        }
    }

    /// Parse memory string (e.g., "128Mi", "1.5Gi", "1024") into bytes.
    ///
    /// Plain numbers (with at most one decimal point) are already bytes.
    /// Suffixes are case-insensitive powers of 1024. Fractional results are
    /// truncated toward zero.
    pub fn parse_memory(s: &str) -> Result<u64, QuantityError> {
        let s = s.trim();

        if is_plain_number(s) {
            if let Ok(bytes) = s.parse::<u64>() {
                return Ok(bytes);
            }
            return s
                .parse::<f64>()
                .ok()
                .and_then(truncate_non_negative)
                .ok_or_else(|| QuantityError::invalid_format(s));
        }

        let caps = MEMORY_WITH_UNIT
            .captures(s)
            .ok_or_else(|| QuantityError::invalid_format(s))?;

        let multiplier = match caps[2].to_ascii_lowercase().as_str() {
            "ki" => KIB,
            "mi" => MIB,
            "gi" => GIB,
            _ => return Err(QuantityError::invalid_format(s)),
        };

        let value = &caps[1];
        if let Ok(whole) = value.parse::<u64>() {
            return whole
                .checked_mul(multiplier)
                .ok_or_else(|| QuantityError::invalid_format(s));
        }

        value
            .parse::<f64>()
            .ok()
            .and_then(|v| truncate_non_negative(v * multiplier as f64))
            .ok_or_else(|| QuantityError::invalid_format(s))
    }

    /// Read a memory value from JSON: numbers are bytes, strings are parsed
    pub fn memory_from_value(value: &Value) -> Result<u64, QuantityError> {
        match value {
            Value::String(s) => Self::parse_memory(s),
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().and_then(truncate_non_negative))
                .ok_or_else(|| QuantityError::invalid_format(n.to_string())),
            other => Err(QuantityError::invalid_type(json_type_name(other))),
        }
    }

    /// Read a CPU value from JSON: numbers are cores, strings are parsed
    pub fn cpu_from_value(value: &Value) -> Result<u64, QuantityError> {
        match value {
            Value::String(s) => Self::parse_cpu(s),
            Value::Number(n) => match n.as_u64() {
                Some(cores) => cores
                    .checked_mul(1000)
                    .ok_or_else(|| QuantityError::invalid_cpu(n.to_string())),
                None => n
                    .as_f64()
                    .and_then(cores_to_millicores)
                    .ok_or_else(|| QuantityError::invalid_cpu(n.to_string())),
            },
            other => Err(QuantityError::invalid_type(json_type_name(other))),
        }
    }

    /// Read `{cpu, memory}` out of a JSON object. Missing keys count as zero.
    pub fn from_value_map(value: &Value) -> Result<Self, QuantityError> {
        let map = value
            .as_object()
            .ok_or_else(|| QuantityError::invalid_type(json_type_name(value)))?;

        let cpu_millicores = match map.get("cpu") {
            Some(v) => Self::cpu_from_value(v)?,
            None => 0,
        };
        let memory_bytes = match map.get("memory") {
            Some(v) => Self::memory_from_value(v)?,
            None => 0,
        };

        Ok(Self {
            cpu_millicores,
            memory_bytes,
        })
    }

    /// Get CPU and memory from a resource map (k8s-openapi format)
    pub fn from_k8s_resource_map(
        resources: &BTreeMap<String, Quantity>,
    ) -> Result<Self, QuantityError> {
        let cpu_millicores = match resources.get("cpu") {
            Some(q) => Self::parse_cpu(&q.0)?,
            None => 0,
        };
        let memory_bytes = match resources.get("memory") {
            Some(q) => Self::parse_memory(&q.0)?,
            None => 0,
        };

        Ok(Self {
            cpu_millicores,
            memory_bytes,
        })
    }
}

fn is_plain_number(s: &str) -> bool {
    let mut dots = 0;
    let mut digits = 0;
    for c in s.chars() {
        match c {
            '.' => dots += 1,
            c if c.is_ascii_digit() => digits += 1,
            _ => return false,
        }
    }
    digits > 0 && dots <= 1
}

fn truncate_non_negative(v: f64) -> Option<u64> {
    if v.is_finite() && v >= 0.0 && v < u64::MAX as f64 {
        Some(v.trunc() as u64)
    } else {
        None
    }
}

fn cores_to_millicores(cores: f64) -> Option<u64> {
    if cores.is_finite() && cores >= 0.0 {
        Some((cores * 1000.0).round() as u64)
    } else {
        None
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
