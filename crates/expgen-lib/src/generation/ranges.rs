//! Optimization ranges for container resource quantities
//!
//! A requested quantity becomes an integer parameter at the resource's preferred scale:
//! millicores for CPU, megabytes for memory. Ranges are derived from the baseline when
//! there is one, otherwise from the configured or built-in bounds.

use crate::quantity::{as_scaled_int, quantity_suffix, Format, Quantity, Scale};

/// Resources with a range policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Cpu,
    Memory,
}

impl ResourceKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cpu" => Some(ResourceKind::Cpu),
            "memory" => Some(ResourceKind::Memory),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Memory => "memory",
        }
    }

    fn default_scale(self) -> Scale {
        match self {
            ResourceKind::Cpu => Scale::MILLI,
            ResourceKind::Memory => Scale::MEGA,
        }
    }

    fn builtin_min(self) -> Quantity {
        match self {
            ResourceKind::Cpu => Quantity::new_milli(100),
            ResourceKind::Memory => Quantity::new(128_i64 << 20, Format::BinarySI),
        }
    }

    fn builtin_max(self) -> Quantity {
        match self {
            ResourceKind::Cpu => Quantity::new(4, Format::DecimalSI),
            ResourceKind::Memory => Quantity::new(4096_i64 << 20, Format::BinarySI),
        }
    }

    /// Lower bound derived from a baseline
    fn min_for(self, v: i32) -> i32 {
        match self {
            ResourceKind::Cpu => (v / 20) * 10,
            ResourceKind::Memory => floor_pow2(v / 2),
        }
    }

    /// Upper bound derived from a baseline
    fn max_for(self, v: i32) -> i32 {
        match self {
            ResourceKind::Cpu => ceil_div(v, 10).saturating_mul(20),
            ResourceKind::Memory => ceil_pow2(v.saturating_mul(2)),
        }
    }
}

/// Explicit bounds for one resource, from configuration or a LimitRange
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceBounds {
    pub min: Option<Quantity>,
    pub max: Option<Quantity>,
    pub default_request: Option<Quantity>,
}

impl ResourceBounds {
    /// Fill unset values from `fallback`
    pub fn or(self, fallback: &ResourceBounds) -> Self {
        Self {
            min: self.min.or_else(|| fallback.min.clone()),
            max: self.max.or_else(|| fallback.max.clone()),
            default_request: self.default_request.or_else(|| fallback.default_request.clone()),
        }
    }
}

/// A derived integer range with the unit suffix used to render it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRange {
    pub baseline: Option<i32>,
    pub min: i32,
    pub max: i32,
    pub suffix: &'static str,
}

/// Compute the range of `kind` given the requested quantity (if any) and explicit bounds
pub fn resource_range(kind: ResourceKind, request: Option<&Quantity>, bounds: &ResourceBounds) -> ResourceRange {
    let baseline = request
        .filter(|q| !q.is_zero())
        .or_else(|| bounds.default_request.as_ref().filter(|q| !q.is_zero()));

    let scale = baseline.map_or(kind.default_scale(), |q| select_scale(q, kind.default_scale()));
    let suffix = quantity_suffix(scale, Format::DecimalSI);

    let mut min = as_scaled_int(bounds.min.as_ref().unwrap_or(&kind.builtin_min()), scale);
    let mut max = as_scaled_int(bounds.max.as_ref().unwrap_or(&kind.builtin_max()), scale);

    let baseline = baseline.map(|q| saturate(q.scaled_value(scale)));
    if let Some(v) = baseline {
        min = kind.min_for(v);
        match &bounds.max {
            Some(_) => raise_max(&mut max, v, kind.max_for(v), as_scaled_int(&kind.builtin_max(), scale)),
            None => set_max(&mut max, v, kind.max_for(v)),
        }
    }

    ResourceRange {
        baseline,
        min,
        max,
        suffix,
    }
}

/// Prefer the default scale; step to finer scales while the value would scale to zero
fn select_scale(q: &Quantity, default: Scale) -> Scale {
    let mut scale = default;
    while scale >= Scale::NANO {
        if as_scaled_int(q, scale) != 0 {
            return scale;
        }
        scale = scale.finer();
    }
    default
}

/// Raise the maximum to the baseline if needed, otherwise tighten it to the derived bound
fn set_max(m: &mut i32, v: i32, b: i32) {
    if v > *m {
        *m = v;
    } else if b < *m {
        *m = b;
    }
}

/// Raise an explicit maximum to the derived bound while that stays within the built-in ceiling
fn raise_max(m: &mut i32, v: i32, b: i32, ceiling: i32) {
    if b > *m && b <= ceiling {
        *m = b;
    }
    *m = (*m).max(v);
}

fn ceil_div(v: i32, d: i32) -> i32 {
    v.saturating_add(d - 1).div_euclid(d)
}

fn floor_pow2(v: i32) -> i32 {
    if v <= 0 {
        return 0;
    }
    1 << (31 - v.leading_zeros())
}

fn ceil_pow2(v: i32) -> i32 {
    if v <= 1 {
        return 1;
    }
    let p = 32 - (v - 1).leading_zeros();
    if p >= 31 {
        i32::MAX
    } else {
        1 << p
    }
}

fn saturate(v: i64) -> i32 {
    v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}
