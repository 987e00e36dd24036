use std::fmt;

/// Frames per second as an exact rational, e.g. 30000/1001 for NTSC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameRate {
    /// Returns `None` unless both terms are positive.
    pub fn new(numerator: i32, denominator: i32) -> Option<Self> {
        if numerator <= 0 || denominator <= 0 {
            return None;
        }
        Some(Self {
            numerator: numerator as u32,
            denominator: denominator as u32,
        })
    }

    pub fn from_integer(fps: u32) -> Option<Self> {
        Self::new(fps as i32, 1)
    }

    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Closest rate whose reduced denominator is at most `max_denominator`.
    ///
    /// Rates taken from a 90 kHz container clock, e.g. 27090000/903003,
    /// come out as the best continued-fraction approximation.
    pub fn limit_denominator(&self, max_denominator: u32) -> FrameRate {
        let max = max_denominator.max(1) as u64;
        let g = gcd(self.numerator as u64, self.denominator as u64);
        let (n, d) = (self.numerator as u64 / g, self.denominator as u64 / g);
        if d <= max {
            return Self::from_terms(n, d);
        }

        let (mut p0, mut q0, mut p1, mut q1) = (0u64, 1u64, 1u64, 0u64);
        let (mut num, mut den) = (n, d);
        loop {
            let a = num / den;
            let q2 = q0 + a * q1;
            if q2 > max {
                break;
            }
            (p0, q0, p1, q1) = (p1, q1, p0 + a * p1, q2);
            (num, den) = (den, num - a * den);
        }

        let k = (max - q0) / q1;
        let lower = (p0 + k * p1, q0 + k * q1);
        let upper = (p1, q1);
        // |p/q - n/d| scaled by q*d; cross-multiply to compare candidates.
        let error = |(p, q): (u64, u64)| (p as i128 * d as i128 - n as i128 * q as i128).abs();
        let (a, b) = (error(upper) * lower.1 as i128, error(lower) * upper.1 as i128);
        if a <= b {
            Self::from_terms(upper.0, upper.1)
        } else {
            Self::from_terms(lower.0, lower.1)
        }
    }

    fn from_terms(numerator: u64, denominator: u64) -> FrameRate {
        FrameRate {
            numerator: numerator.min(u32::MAX as u64) as u32,
            denominator: denominator.max(1) as u32,
        }
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.max(1)
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == 1 {
            write!(f, "{}", self.numerator)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub total_frames: usize,
    pub codec: String,
}

impl VideoMetadata {
    pub fn fps(&self) -> f64 {
        self.frame_rate.as_f64()
    }
}
