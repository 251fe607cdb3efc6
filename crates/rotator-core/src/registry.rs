//! Fixed-size collection of independent rotators.

use thiserror::Error;

use crate::device::Rotator;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("no such device: {index} (configured devices: 0..{count})")]
    NoSuchDevice { index: usize, count: usize },
}

/// All simulated rotators, indexed 0..N-1 and sized once at startup.
///
/// Each rotator carries its own guard; nothing is shared across
/// devices, so they step and answer queries concurrently.
pub struct RotatorBank {
    devices: Vec<Rotator>,
}

impl RotatorBank {
    pub fn new(device_count: usize, step_size_deg: f64, steps_per_sec: u32) -> Self {
        let devices = (0..device_count)
            .map(|_| Rotator::new(step_size_deg, steps_per_sec))
            .collect();
        Self { devices }
    }

    pub fn get(&self, index: usize) -> Result<&Rotator, DeviceError> {
        self.devices.get(index).ok_or(DeviceError::NoSuchDevice {
            index,
            count: self.devices.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rotator> {
        self.devices.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_within_range() {
        let bank = RotatorBank::new(4, 1.0, 6);
        assert_eq!(bank.len(), 4);
        assert!(bank.get(0).is_ok());
        assert!(bank.get(3).is_ok());
    }

    #[test]
    fn lookup_out_of_range_fails() {
        let bank = RotatorBank::new(4, 1.0, 6);
        let err = bank.get(4).unwrap_err();
        assert_eq!(err, DeviceError::NoSuchDevice { index: 4, count: 4 });
        assert!(bank.get(usize::MAX).is_err());
    }

    #[test]
    fn devices_are_independent() {
        let bank = RotatorBank::new(2, 1.0, 100);
        let a = bank.get(0).unwrap();
        let b = bank.get(1).unwrap();
        a.set_connected(true);
        a.move_absolute(5.0);
        assert!(!b.is_connected());
        assert!(!b.is_moving());
        assert_eq!(b.position(), 0.0);
        a.halt();
    }
}
