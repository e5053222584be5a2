//! Per-channel volume with balance and fade helpers.
//!
//! Values are linear, `1.0` being 100% (raw `65536` on the pulse wire).

use serde::{Deserialize, Serialize};

/// Raw volume value meaning 100%.
pub const VOLUME_NORM: u32 = 0x10000;

/// Speaker position of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelPosition {
    Mono,
    FrontLeft,
    FrontRight,
    FrontCenter,
    RearLeft,
    RearRight,
    RearCenter,
    SideLeft,
    SideRight,
    Lfe,
    Other,
}

impl ChannelPosition {
    /// Parse a pulse channel name (`front-left`, `rear-right`, ...).
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "mono" => Self::Mono,
            "front-left" | "left" => Self::FrontLeft,
            "front-right" | "right" => Self::FrontRight,
            "front-center" | "center" => Self::FrontCenter,
            "rear-left" => Self::RearLeft,
            "rear-right" => Self::RearRight,
            "rear-center" => Self::RearCenter,
            "side-left" => Self::SideLeft,
            "side-right" => Self::SideRight,
            "lfe" | "subwoofer" => Self::Lfe,
            _ => Self::Other,
        }
    }

    /// Pulse channel name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Mono => "mono",
            Self::FrontLeft => "front-left",
            Self::FrontRight => "front-right",
            Self::FrontCenter => "front-center",
            Self::RearLeft => "rear-left",
            Self::RearRight => "rear-right",
            Self::RearCenter => "rear-center",
            Self::SideLeft => "side-left",
            Self::SideRight => "side-right",
            Self::Lfe => "lfe",
            Self::Other => "aux0",
        }
    }

    fn is_left(self) -> bool {
        matches!(self, Self::FrontLeft | Self::RearLeft | Self::SideLeft)
    }

    fn is_right(self) -> bool {
        matches!(self, Self::FrontRight | Self::RearRight | Self::SideRight)
    }

    fn is_front(self) -> bool {
        matches!(self, Self::FrontLeft | Self::FrontRight | Self::FrontCenter)
    }

    fn is_rear(self) -> bool {
        matches!(self, Self::RearLeft | Self::RearRight | Self::RearCenter)
    }
}

/// One linear value per channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelVolume {
    pub positions: Vec<ChannelPosition>,
    pub values: Vec<f64>,
}

impl Default for ChannelVolume {
    fn default() -> Self {
        Self::stereo(1.0)
    }
}

impl ChannelVolume {
    /// Two channels at the same level.
    #[must_use]
    pub fn stereo(level: f64) -> Self {
        Self {
            positions: vec![ChannelPosition::FrontLeft, ChannelPosition::FrontRight],
            values: vec![level, level],
        }
    }

    /// Build from pulse raw values.
    #[must_use]
    pub fn from_raw(channels: impl IntoIterator<Item = (ChannelPosition, u32)>) -> Self {
        let (positions, values) =
            channels.into_iter().map(|(p, raw)| (p, f64::from(raw) / f64::from(VOLUME_NORM))).unzip();
        Self { positions, values }
    }

    /// Pulse raw values, in channel order.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_raw(&self) -> Vec<u32> {
        self.values.iter().map(|v| (v.max(0.0) * f64::from(VOLUME_NORM)).round() as u32).collect()
    }

    /// Overall level: the loudest channel.
    ///
    /// Scaling, balance and fade all preserve this value, so a level written
    /// with [`Self::with_avg`] reads back unchanged after balance is applied.
    #[must_use]
    pub fn avg(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }

    /// Scale every channel so the overall level becomes `level`.
    #[must_use]
    pub fn with_avg(&self, level: f64) -> Self {
        let level = level.max(0.0);
        let current = self.avg();
        let values = if current <= f64::EPSILON {
            vec![level; self.values.len()]
        } else {
            self.values.iter().map(|v| v * level / current).collect()
        };
        Self { positions: self.positions.clone(), values }
    }

    /// Right-vs-left ratio in `[-1, 1]`; negative leans left.
    #[must_use]
    pub fn balance(&self) -> f64 {
        let left = self.mean_where(ChannelPosition::is_left);
        let right = self.mean_where(ChannelPosition::is_right);
        ratio(left, right)
    }

    /// Rebalance left and right channels, keeping the louder side's level.
    #[must_use]
    pub fn with_balance(&self, balance: f64) -> Self {
        self.with_ratio(balance, ChannelPosition::is_left, ChannelPosition::is_right)
    }

    /// Rear-vs-front ratio in `[-1, 1]`; negative leans front.
    #[must_use]
    pub fn fade(&self) -> f64 {
        let front = self.mean_where(ChannelPosition::is_front);
        let rear = self.mean_where(ChannelPosition::is_rear);
        ratio(front, rear)
    }

    /// Refade front and rear channels, keeping the louder side's level.
    #[must_use]
    pub fn with_fade(&self, fade: f64) -> Self {
        self.with_ratio(fade, ChannelPosition::is_front, ChannelPosition::is_rear)
    }

    fn mean_where(&self, pick: fn(ChannelPosition) -> bool) -> Option<f64> {
        let picked: Vec<f64> = self
            .positions
            .iter()
            .zip(&self.values)
            .filter(|(p, _)| pick(**p))
            .map(|(_, v)| *v)
            .collect();
        if picked.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = picked.len() as f64;
        Some(picked.iter().sum::<f64>() / n)
    }

    fn with_ratio(
        &self,
        target: f64,
        low: fn(ChannelPosition) -> bool,
        high: fn(ChannelPosition) -> bool,
    ) -> Self {
        let (Some(lo), Some(hi)) = (self.mean_where(low), self.mean_where(high)) else {
            return self.clone();
        };
        let target = target.clamp(-1.0, 1.0);
        let m = lo.max(hi);
        let (new_lo, new_hi) = if target < 0.0 { (m, m * (1.0 + target)) } else { (m * (1.0 - target), m) };

        let values = self
            .positions
            .iter()
            .zip(&self.values)
            .map(|(p, v)| {
                if low(*p) {
                    rescale(*v, lo, new_lo)
                } else if high(*p) {
                    rescale(*v, hi, new_hi)
                } else {
                    *v
                }
            })
            .collect();
        Self { positions: self.positions.clone(), values }
    }
}

fn ratio(low: Option<f64>, high: Option<f64>) -> f64 {
    let (Some(low), Some(high)) = (low, high) else {
        return 0.0;
    };
    if (low - high).abs() <= f64::EPSILON {
        0.0
    } else if low > high {
        high / low - 1.0
    } else {
        1.0 - low / high
    }
}

fn rescale(value: f64, from: f64, to: f64) -> f64 {
    if from <= f64::EPSILON { to } else { value * to / from }
}
