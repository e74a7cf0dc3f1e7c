//! Per-model conversion coefficients.
//!
//! Every controller model converts engineering units (amps, volts) to the
//! 0-255 range the firmware understands with its own shunt and divider
//! values. The forward and reverse maps are measured separately and are not
//! always exact inverses of each other, so both directions are stored.

/// Engineering quantity converted through a model's coefficient table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    PhaseCurrent,
    BatteryCurrent,
    Voltage,
}

/// Affine map `x * gain + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Linear {
    pub gain: f64,
    pub offset: f64,
}

impl Linear {
    pub const fn new(gain: f64, offset: f64) -> Self {
        Self { gain, offset }
    }

    pub const fn scale(gain: f64) -> Self {
        Self { gain, offset: 0.0 }
    }

    pub fn apply(&self, x: f64) -> f64 {
        x * self.gain + self.offset
    }
}

/// Fixed byte written at a frame offset after encoding.
///
/// The overridden byte is not round-trippable: decoding ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteOverride {
    pub offset: usize,
    pub value: u8,
}

/// Coefficients for one hardware revision within a family.
#[derive(Debug, Clone, Copy)]
pub struct CoefficientSet {
    /// User-visible model name, e.g. `EB212/Lyen`
    pub name: &'static str,
    /// Identifier transmitted in the model slot of the frame
    pub model_id: u8,
    pub phase_to_raw: Linear,
    pub raw_to_phase: Linear,
    pub battery_to_raw: Linear,
    pub raw_to_battery: Linear,
    pub volts_to_raw: Linear,
    pub raw_to_volts: Linear,
    pub quirk: Option<ByteOverride>,
}

/// Conversions between engineering units and raw controller values.
pub trait ModelCoefficients {
    fn phase_current_to_raw(&self, amps: f64) -> f64;
    fn raw_to_phase_current(&self, raw: f64) -> f64;
    fn battery_current_to_raw(&self, amps: f64) -> f64;
    fn raw_to_battery_current(&self, raw: f64) -> f64;
    fn voltage_to_raw(&self, volts: f64) -> f64;
    fn raw_to_voltage(&self, raw: f64) -> f64;

    fn to_raw(&self, quantity: Quantity, value: f64) -> f64 {
        match quantity {
            Quantity::PhaseCurrent => self.phase_current_to_raw(value),
            Quantity::BatteryCurrent => self.battery_current_to_raw(value),
            Quantity::Voltage => self.voltage_to_raw(value),
        }
    }

    fn from_raw(&self, quantity: Quantity, raw: f64) -> f64 {
        match quantity {
            Quantity::PhaseCurrent => self.raw_to_phase_current(raw),
            Quantity::BatteryCurrent => self.raw_to_battery_current(raw),
            Quantity::Voltage => self.raw_to_voltage(raw),
        }
    }
}

impl ModelCoefficients for CoefficientSet {
    fn phase_current_to_raw(&self, amps: f64) -> f64 {
        self.phase_to_raw.apply(amps)
    }

    fn raw_to_phase_current(&self, raw: f64) -> f64 {
        self.raw_to_phase.apply(raw)
    }

    fn battery_current_to_raw(&self, amps: f64) -> f64 {
        self.battery_to_raw.apply(amps)
    }

    fn raw_to_battery_current(&self, raw: f64) -> f64 {
        self.raw_to_battery.apply(raw)
    }

    fn voltage_to_raw(&self, volts: f64) -> f64 {
        self.volts_to_raw.apply(volts)
    }

    fn raw_to_voltage(&self, raw: f64) -> f64 {
        self.raw_to_volts.apply(raw)
    }
}

impl CoefficientSet {
    /// Model whose raw values are plain multiples of the engineering value.
    pub const fn proportional(
        name: &'static str,
        model_id: u8,
        phase_per_amp: f64,
        battery_per_amp: f64,
        raw_per_volt: f64,
    ) -> Self {
        Self {
            name,
            model_id,
            phase_to_raw: Linear::scale(phase_per_amp),
            raw_to_phase: Linear::scale(1.0 / phase_per_amp),
            battery_to_raw: Linear::scale(battery_per_amp),
            raw_to_battery: Linear::scale(1.0 / battery_per_amp),
            volts_to_raw: Linear::scale(raw_per_volt),
            raw_to_volts: Linear::scale(1.0 / raw_per_volt),
            quirk: None,
        }
    }

    /// Name component before the first `/`, used to annotate text profiles.
    pub fn name_prefix(&self) -> &'static str {
        match self.name.find('/') {
            Some(i) => &self.name[..i],
            None => self.name,
        }
    }

    pub const fn with_quirk(mut self, offset: usize, value: u8) -> Self {
        self.quirk = Some(ByteOverride { offset, value });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: CoefficientSet = CoefficientSet {
        name: "EB209/Lyen",
        model_id: 7,
        phase_to_raw: Linear::new(1.25, -19.2),
        raw_to_phase: Linear::new(0.8, 15.36),
        battery_to_raw: Linear::new(1.249, -2.26),
        raw_to_battery: Linear::new(0.8, 1.81),
        volts_to_raw: Linear::scale(3.281),
        raw_to_volts: Linear::scale(1.0 / 3.281),
        quirk: None,
    };

    #[test]
    fn test_affine_maps() {
        assert!((SAMPLE.phase_current_to_raw(30.0) - 18.3).abs() < 1e-9);
        assert!((SAMPLE.raw_to_phase_current(10.0) - 23.36).abs() < 1e-9);
        assert!((SAMPLE.to_raw(Quantity::Voltage, 10.0) - 32.81).abs() < 1e-9);
    }

    #[test]
    fn test_phase_maps_are_inverse() {
        for raw in 0..=255 {
            let amps = SAMPLE.from_raw(Quantity::PhaseCurrent, raw as f64);
            assert_eq!(SAMPLE.to_raw(Quantity::PhaseCurrent, amps).round() as i32, raw);
        }
    }

    #[test]
    fn test_name_prefix() {
        assert_eq!(SAMPLE.name_prefix(), "EB209");
        let plain = CoefficientSet::proportional("KH606", 1, 2.85, 5.10, 3.285);
        assert_eq!(plain.name_prefix(), "KH606");
    }

    #[test]
    fn test_proportional_model() {
        let model = CoefficientSet::proportional("KH612", 3, 1.20, 2.73, 3.285);
        assert!((model.battery_current_to_raw(10.0) - 27.3).abs() < 1e-9);
        assert!((model.raw_to_battery_current(27.3) - 10.0).abs() < 1e-9);
        assert!(model.quirk.is_none());
        assert_eq!(model.with_quirk(23, 80).quirk, Some(ByteOverride { offset: 23, value: 80 }));
    }
}
