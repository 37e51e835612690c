use std::collections::HashMap;
use std::sync::Mutex;

use crate::RegisterFile;

/// In-memory register file backing the host simulator and tests.
///
/// Every address reads back the last value written, or zero if untouched,
/// like a power-on register bank. All accesses acknowledge.
#[derive(Default)]
pub struct MemRegisterFile {
    regs: Mutex<HashMap<u32, u32>>,
}

impl MemRegisterFile {
    pub fn new() -> MemRegisterFile {
        MemRegisterFile::default()
    }

    fn key(device: u8, register: u16) -> u32 {
        regbus_protocol::flat_addr(device, register)
    }
}

impl RegisterFile for MemRegisterFile {
    fn write(&self, device: u8, register: u16, value: u32) -> bool {
        self.regs
            .lock()
            .unwrap()
            .insert(Self::key(device, register), value);
        true
    }

    fn read(&self, device: u8, register: u16) -> Option<u32> {
        Some(
            self.regs
                .lock()
                .unwrap()
                .get(&Self::key(device, register))
                .copied()
                .unwrap_or(0),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reads_back_writes() {
        let mem = MemRegisterFile::new();
        assert_eq!(mem.read(0, 0), Some(0));
        assert!(mem.write(3, 100, 42));
        assert_eq!(mem.read(3, 100), Some(42));
        // Distinct devices, same register index.
        assert!(mem.write(4, 100, 7));
        assert_eq!(mem.read(3, 100), Some(42));
        assert_eq!(mem.read(4, 100), Some(7));
    }
}
