//! AKM8975 magnetic field calibration
//!
//! Raw counts go through sensitivity adjustment (fuse ROM ASA values),
//! conversion to µT, the board's mounting rotation, hard-iron offset removal
//! and a moving average. The offset is estimated from the running extremes of
//! each axis and persisted between activations.

use crate::SensorError;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Field per LSB of the AK8975, in µT
pub const MICROTESLA_PER_LSB: f32 = 0.3;

/// Per-axis span (µT) required before the offset is re-estimated; about one
/// full turn in the earth's field
pub const OFFSET_MIN_SPAN: f32 = 40.0;

const OFFSET_KEYS: [&str; 3] = ["HO.x", "HO.y", "HO.z"];

/// Sensitivity-adjusted value: `h × ((asa − 128) / 256 + 1)`
pub fn adjust_sensitivity(raw: i16, asa: u8) -> f32 {
    raw as f32 * ((asa as f32 - 128.0) / 256.0 + 1.0)
}

/// Map chip axes to device axes for mounting pattern 1..=8
pub fn rotate(layout: u8, v: [f32; 3]) -> [f32; 3] {
    let [x, y, z] = v;
    match layout {
        1 => [x, y, z],
        2 => [y, -x, z],
        3 => [-x, -y, z],
        4 => [-y, x, z],
        5 => [-x, y, -z],
        6 => [y, x, -z],
        7 => [x, -y, -z],
        8 => [-y, -x, -z],
        _ => v,
    }
}

#[derive(Debug, Clone)]
pub struct Compass {
    asa: [u8; 3],
    layout: u8,
    averaging: usize,
    offset: [f32; 3],
    min: [f32; 3],
    max: [f32; 3],
    window: VecDeque<[f32; 3]>,
}

impl Compass {
    pub fn new(asa: [u8; 3], layout: u8, averaging: usize) -> Self {
        Self {
            asa,
            layout,
            averaging: averaging.max(1),
            offset: [0.0; 3],
            min: [f32::MAX; 3],
            max: [f32::MIN; 3],
            window: VecDeque::with_capacity(averaging.max(1)),
        }
    }

    pub fn asa(&self) -> [u8; 3] {
        self.asa
    }

    pub fn offset(&self) -> [f32; 3] {
        self.offset
    }

    pub fn set_offset(&mut self, offset: [f32; 3]) {
        self.offset = offset;
    }

    pub fn has_offset(&self) -> bool {
        self.offset.iter().any(|&o| o != 0.0)
    }

    /// Forget the averaging window and the observed extremes
    pub fn reset(&mut self) {
        self.window.clear();
        self.min = [f32::MAX; 3];
        self.max = [f32::MIN; 3];
    }

    /// Calibrated field, in µT, for one raw sample
    pub fn process(&mut self, raw: [i16; 3]) -> [f32; 3] {
        let mut field = [0.0; 3];
        for axis in 0..3 {
            field[axis] = adjust_sensitivity(raw[axis], self.asa[axis]) * MICROTESLA_PER_LSB;
        }
        let field = rotate(self.layout, field);

        self.track_offset(&field);

        let mut corrected = [0.0; 3];
        for axis in 0..3 {
            corrected[axis] = field[axis] - self.offset[axis];
        }

        if self.window.len() == self.averaging {
            self.window.pop_front();
        }
        self.window.push_back(corrected);

        let count = self.window.len() as f32;
        let mut average = [0.0; 3];
        for sample in &self.window {
            for axis in 0..3 {
                average[axis] += sample[axis] / count;
            }
        }
        average
    }

    fn track_offset(&mut self, field: &[f32; 3]) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(field[axis]);
            self.max[axis] = self.max[axis].max(field[axis]);
        }

        let spanned = (0..3).all(|axis| self.max[axis] - self.min[axis] >= OFFSET_MIN_SPAN);
        if spanned {
            for axis in 0..3 {
                self.offset[axis] = (self.max[axis] + self.min[axis]) / 2.0;
            }
        }
    }

    /// Restore the offset from a `key=value` parameter file
    pub fn load(&mut self, path: &Path) -> Result<(), SensorError> {
        let contents = fs::read_to_string(path)?;
        let mut offset = [None; 3];

        for line in contents.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let Some(axis) = OFFSET_KEYS.iter().position(|k| *k == key.trim()) else {
                continue;
            };

            let value = value.trim().parse::<f32>().map_err(|_| {
                SensorError::InvalidArgument(format!("{}: bad value for {}", path.display(), key))
            })?;
            offset[axis] = Some(value);
        }

        match offset {
            [Some(x), Some(y), Some(z)] => {
                self.offset = [x, y, z];
                tracing::debug!("Loaded magnetic offsets {:?}", self.offset);
                Ok(())
            }
            _ => Err(SensorError::InvalidArgument(format!(
                "{}: missing magnetic offsets",
                path.display()
            ))),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), SensorError> {
        let mut contents = String::new();
        for (key, value) in OFFSET_KEYS.iter().zip(self.offset) {
            let _ = writeln!(contents, "{}={}", key, value);
        }

        fs::write(path, contents)?;
        tracing::debug!("Saved magnetic offsets to {}", path.display());
        Ok(())
    }
}
