//! Controllers for common peripherals found behind a register bus.
//!
//! These are thin callers of [RegisterBus]; all protocol work happens in
//! the session. Each controller is bound to one device/register pair at
//! construction and issues its transactions with a fixed per-controller
//! timeout.

use std::thread;
use std::time::Duration;

use crate::error::BusError;
use crate::link::Link;
use crate::session::RegisterBus;

/// Default reply timeout for peripheral transactions.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// Controller for a discrete 32-bit general-purpose-output register.
/// Each register bit is directly tied to an output pin or a control flag.
///
/// Keeps a shadow of the last written value so individual bits can be set
/// or cleared without a read-modify-write over the bus.
pub struct Gpo<'a, L: Link> {
    bus: &'a RegisterBus<L>,
    device: u8,
    register: u16,
    shadow: u32,
    timeout: Duration,
}

impl<'a, L: Link> Gpo<'a, L> {
    pub fn new(bus: &'a RegisterBus<L>, device: u8, register: u16, init: u32) -> Gpo<'a, L> {
        Gpo {
            bus,
            device,
            register,
            shadow: init,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Read the current state of the output register from the device.
    pub fn read(&self) -> Result<u32, BusError> {
        self.bus.read(self.device, self.register, self.timeout)
    }

    /// Directly set a new output register value.
    pub fn set(&mut self, bits: u32) -> Result<(), BusError> {
        self.shadow = bits;
        self.bus.write(self.device, self.register, bits, self.timeout)
    }

    /// Raise the bits selected by `mask`, leaving the others unchanged.
    pub fn set_mask(&mut self, mask: u32) -> Result<(), BusError> {
        self.set(self.shadow | mask)
    }

    /// Lower the bits selected by `mask`, leaving the others unchanged.
    pub fn clr_mask(&mut self, mask: u32) -> Result<(), BusError> {
        self.set(self.shadow & !mask)
    }
}

// MDIO command register layout (see the managing core's documentation):
//   Bits 31-28: Reserved / zeros
//   Bits 27-26: Operator ("01" = write, "10" = read)
//   Bits 25-21: PHY address
//   Bits 20-16: REG address
//   Bits 15-00: Write-data (ignored by reads)
const CMD_WRITE: u32 = 0x01 << 26;
const CMD_READ: u32 = 0x02 << 26;
/// Reply contains data.
const STATUS_VALID: u32 = 1 << 30;
const DATA_MASK: u32 = 0xFFFF;
/// Brief pause so the controller can clock the command out to the PHY.
const EXEC_DELAY: Duration = Duration::from_millis(1);

/// Controller for an MDIO interface, usually used to configure attached
/// Ethernet PHY ASIC(s). Includes support for the common indirect register
/// pages (Debug, MMD3, MMD7).
pub struct Mdio<'a, L: Link> {
    bus: &'a RegisterBus<L>,
    device: u8,
    register: u16,
    timeout: Duration,
}

impl<'a, L: Link> Mdio<'a, L> {
    pub fn new(bus: &'a RegisterBus<L>, device: u8, register: u16) -> Mdio<'a, L> {
        Mdio {
            bus,
            device,
            register,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    fn issue(&self, command: u32) -> Result<(), BusError> {
        self.bus
            .write(self.device, self.register, command, self.timeout)?;
        thread::sleep(EXEC_DELAY);
        Ok(())
    }

    /// Write a 16-bit value to a register in the Direct page.
    pub fn write(&self, phy: u8, reg: u8, data: u16) -> Result<(), BusError> {
        let phy = (phy as u32 & 0x1F) << 21;
        let reg = (reg as u32 & 0x1F) << 16;
        self.issue(CMD_WRITE | phy | reg | data as u32)
    }

    /// Read a 16-bit value from a register in the Direct page.
    ///
    /// Returns [BusError::Nack] if the controller reports no valid data
    /// for the issued read.
    pub fn read(&self, phy: u8, reg: u8) -> Result<u16, BusError> {
        let phy_bits = (phy as u32 & 0x1F) << 21;
        let reg_bits = (reg as u32 & 0x1F) << 16;
        self.issue(CMD_READ | phy_bits | reg_bits)?;
        let result = self.bus.read(self.device, self.register, self.timeout)?;
        if result & STATUS_VALID != 0 {
            Ok((result & DATA_MASK) as u16)
        } else {
            Err(BusError::Nack)
        }
    }

    /// Indirect write to the AR8031-style debug page.
    pub fn write_debug(&self, phy: u8, reg: u16, data: u16) -> Result<(), BusError> {
        self.write(phy, 29, reg)?; // Debug register address
        self.write(phy, 30, data) // Debug register value
    }

    /// Indirect write to the MMD3 register page.
    pub fn write_mmd3(&self, phy: u8, reg: u16, data: u16) -> Result<(), BusError> {
        self.write(phy, 13, 0x0003)?; // Next command = MMD3 address
        self.write(phy, 14, reg)?;
        self.write(phy, 13, 0x4003)?; // Next command = MMD3 data
        self.write(phy, 14, data)
    }

    /// Indirect write to the MMD7 register page.
    pub fn write_mmd7(&self, phy: u8, reg: u16, data: u16) -> Result<(), BusError> {
        self.write(phy, 13, 0x0007)?; // Next command = MMD7 address
        self.write(phy, 14, reg)?;
        self.write(phy, 13, 0x4007)?; // Next command = MMD7 data
        self.write(phy, 14, data)
    }
}
