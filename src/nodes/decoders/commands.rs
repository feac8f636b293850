//! QSPI command table
//!
//! Maps an 8-bit command code to the shape of the transaction it starts:
//! which phases follow the command byte and on which data lines they run.
//! The table is built once, then shared read-only (typically behind an `Arc`)
//! between decoders and the simulator.

use bitflags::bitflags;
use std::collections::BTreeMap;

use crate::{QspiError, Result};

bitflags! {
    /// Set of DQ lines carrying bits for a phase
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LineMask: u8 {
        const DQ0 = 1 << 0;
        const DQ1 = 1 << 1;
        const DQ2 = 1 << 2;
        const DQ3 = 1 << 3;

        /// Single line (DQ0)
        const SINGLE = Self::DQ0.bits();
        /// DQ0 and DQ1
        const DUAL = Self::DQ0.bits() | Self::DQ1.bits();
        /// DQ0 through DQ3
        const QUAD = Self::DUAL.bits() | Self::DQ2.bits() | Self::DQ3.bits();
    }
}

impl LineMask {
    /// Mask for a single line index (0..=3)
    pub fn line(index: usize) -> Self {
        Self::from_bits_truncate(1 << index)
    }

    /// Number of lines in the mask
    pub fn line_count(self) -> u32 {
        self.bits().count_ones()
    }
}

/// Protocol shape of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAttributes {
    pub accepts_address: bool,
    pub uses_dummy_cycles: bool,
    pub has_data: bool,
    pub is_write: bool,
    /// Address lines in Extended mode
    pub address_lines: LineMask,
    /// Data lines in Extended mode
    pub data_lines: LineMask,
    pub name: String,
}

impl CommandAttributes {
    /// Command with no address, dummy or data phase
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            accepts_address: false,
            uses_dummy_cycles: false,
            has_data: false,
            is_write: false,
            address_lines: LineMask::empty(),
            data_lines: LineMask::empty(),
            name: name.into(),
        }
    }

    /// Add an address phase on `lines`
    pub fn with_address(mut self, lines: LineMask) -> Self {
        self.accepts_address = true;
        self.address_lines = lines;
        self
    }

    /// Add a dummy-cycle phase
    pub fn with_dummy_cycles(mut self) -> Self {
        self.uses_dummy_cycles = true;
        self
    }

    /// Add a data phase read from the device on `lines`
    pub fn with_read_data(mut self, lines: LineMask) -> Self {
        self.has_data = true;
        self.is_write = false;
        self.data_lines = lines;
        self
    }

    /// Add a data phase written to the device on `lines`
    pub fn with_write_data(mut self, lines: LineMask) -> Self {
        self.has_data = true;
        self.is_write = true;
        self.data_lines = lines;
        self
    }
}

/// Code reported for lookups of unknown commands
///
/// Not a table key itself, so a decoded `0xFE` byte counts as an invalid command.
pub const INVALID_COMMAND_CODE: u8 = 0xFE;

/// Immutable map from command code to [`CommandAttributes`]
#[derive(Debug, Clone)]
pub struct CommandTable {
    commands: BTreeMap<u8, CommandAttributes>,
    invalid: CommandAttributes,
}

impl CommandTable {
    /// Create an empty table. Every code is invalid until inserted.
    pub fn new() -> Self {
        Self {
            commands: BTreeMap::new(),
            invalid: CommandAttributes::bare("ERROR, the world is about to end"),
        }
    }

    /// Add or replace a command.
    ///
    /// Phases must name at least one line, and the line count must split an
    /// 8-bit unit evenly.
    pub fn insert(&mut self, code: u8, attributes: CommandAttributes) -> Result<()> {
        for (present, lines, phase) in [
            (attributes.accepts_address, attributes.address_lines, "address"),
            (attributes.has_data, attributes.data_lines, "data"),
        ] {
            if !present {
                continue;
            }
            let count = lines.line_count();
            if count == 0 || 8 % count != 0 {
                return Err(QspiError::InvalidCommand {
                    code,
                    reason: format!("{} phase on {} lines", phase, count),
                });
            }
        }

        self.commands.insert(code, attributes);
        Ok(())
    }

    /// Attributes for `code`, or the invalid-command record
    pub fn lookup(&self, code: u8) -> &CommandAttributes {
        self.commands.get(&code).unwrap_or(&self.invalid)
    }

    /// True iff `code` is in the table
    pub fn is_valid(&self, code: u8) -> bool {
        self.commands.contains_key(&code)
    }

    /// Command codes in ascending order
    pub fn codes(&self) -> impl Iterator<Item = u8> + '_ {
        self.commands.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Default for CommandTable {
    /// Micron N25Q-style command set
    fn default() -> Self {
        use LineMask as L;
        let bare = CommandAttributes::bare;

        let seed = [
            (0x66, bare("Reset Enable")),
            (0x99, bare("Reset Memory")),
            (0x9E, bare("Read Id").with_read_data(L::DQ1)),
            (0x9F, bare("Read Id").with_read_data(L::DQ1)),
            (0xAF, bare("Multiple I/O Read Id").with_read_data(L::DQ1)),
            (
                0x5A,
                bare("Read Flash Disc Param")
                    .with_address(L::SINGLE)
                    .with_dummy_cycles()
                    .with_read_data(L::DQ1),
            ),
            (0x03, bare("Read").with_address(L::SINGLE).with_read_data(L::DQ1)),
            (
                0x0B,
                bare("Fast Read")
                    .with_address(L::SINGLE)
                    .with_dummy_cycles()
                    .with_read_data(L::DQ1),
            ),
            (
                0x3B,
                bare("Dual Output Fast Read")
                    .with_address(L::SINGLE)
                    .with_dummy_cycles()
                    .with_read_data(L::DUAL),
            ),
            (
                0xBB,
                bare("Dual I/O Fast Read")
                    .with_address(L::DUAL)
                    .with_dummy_cycles()
                    .with_read_data(L::DUAL),
            ),
            (
                0x6B,
                bare("Quad Output Fast Read")
                    .with_address(L::SINGLE)
                    .with_dummy_cycles()
                    .with_read_data(L::QUAD),
            ),
            (
                0xEB,
                bare("Quad I/O Fast Read")
                    .with_address(L::QUAD)
                    .with_dummy_cycles()
                    .with_read_data(L::QUAD),
            ),
            (0x06, bare("Write Enable")),
            (0x04, bare("Write Disable")),
            (0x05, bare("Read Status Reg").with_read_data(L::DQ1)),
            (0x01, bare("Write Status Reg").with_write_data(L::SINGLE)),
            (0xE8, bare("Read Lock Reg").with_address(L::SINGLE).with_read_data(L::DQ1)),
            (0xE5, bare("Write Lock Reg").with_address(L::SINGLE).with_write_data(L::SINGLE)),
            (0x70, bare("Read Flag Status Reg").with_read_data(L::DQ1)),
            (0x50, bare("Clear Flag Status Reg")),
            (0xB5, bare("Read NonVol Cfg Reg").with_read_data(L::DQ1)),
            (0xB1, bare("Write NonVol Cfg Reg").with_write_data(L::SINGLE)),
            (0x85, bare("Read Vol Cfg Reg").with_read_data(L::DQ1)),
            (0x81, bare("Write Vol Cfg Reg").with_write_data(L::SINGLE)),
            (0x65, bare("Read En Vol Cfg Reg").with_read_data(L::DQ1)),
            (0x61, bare("Write En Vol Cfg Reg").with_write_data(L::SINGLE)),
            (0x02, bare("Page Pgm").with_address(L::SINGLE).with_write_data(L::SINGLE)),
            (0xA2, bare("Dual Input Fast Pgm").with_address(L::SINGLE).with_write_data(L::DUAL)),
            (0xD2, bare("Ext Dual Input Fast Pgm").with_address(L::DUAL).with_write_data(L::DUAL)),
            (0x32, bare("Quad Input Fast Pgm").with_address(L::SINGLE).with_write_data(L::QUAD)),
            (0x12, bare("Ext Quad Input Fast Pgm").with_address(L::QUAD).with_write_data(L::QUAD)),
            (0x38, bare("Quad Page Pgm").with_address(L::QUAD).with_write_data(L::QUAD)),
            (0x20, bare("Subsector Erase").with_address(L::SINGLE)),
            (0xD8, bare("Sector Erase").with_address(L::SINGLE)),
            (0xC7, bare("Bulk Erase")),
            (0x7A, bare("Pgm/Erase Resume")),
            (0x75, bare("Pgm/Erase Suspend")),
            (
                0x4B,
                bare("Read OTP Array")
                    .with_address(L::SINGLE)
                    .with_dummy_cycles()
                    .with_read_data(L::DQ1),
            ),
            (0x42, bare("Pgm OTP Array").with_address(L::SINGLE).with_write_data(L::SINGLE)),
            (0xB9, bare("Deep Power-Down")),
            (0xAB, bare("Release From DPD")),
        ];

        let mut table = Self::new();
        for (code, attributes) in seed {
            // Seed entries all use 1, 2 or 4 lines
            if let Err(e) = table.insert(code, attributes) {
                tracing::error!("Bad built-in command entry: {}", e);
            }
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_contents() {
        let table = CommandTable::default();
        assert_eq!(table.len(), 41);

        let quad_read = table.lookup(0xEB);
        assert!(quad_read.accepts_address);
        assert!(quad_read.uses_dummy_cycles);
        assert!(quad_read.has_data);
        assert!(!quad_read.is_write);
        assert_eq!(quad_read.address_lines, LineMask::QUAD);
        assert_eq!(quad_read.data_lines, LineMask::QUAD);
        assert_eq!(quad_read.name, "Quad I/O Fast Read");

        let page_program = table.lookup(0x02);
        assert!(page_program.is_write);
        assert_eq!(page_program.data_lines, LineMask::SINGLE);
    }

    #[test]
    fn test_unknown_code_degrades_to_sentinel() {
        let table = CommandTable::default();
        assert!(!table.is_valid(0x00));
        assert!(!table.is_valid(INVALID_COMMAND_CODE));

        let attrs = table.lookup(0x00);
        assert!(!attrs.accepts_address);
        assert!(!attrs.uses_dummy_cycles);
        assert!(!attrs.has_data);
        assert_eq!(attrs, table.lookup(INVALID_COMMAND_CODE));
    }

    #[test]
    fn test_codes_ascending() {
        let table = CommandTable::default();
        let codes: Vec<u8> = table.codes().collect();
        assert_eq!(codes.first(), Some(&0x01));
        assert_eq!(codes.last(), Some(&0xEB));
        assert!(codes.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_insert_rejects_bad_line_masks() {
        let mut table = CommandTable::new();
        assert!(table.is_empty());

        let no_lines = CommandAttributes::bare("broken").with_address(LineMask::empty());
        assert!(matches!(
            table.insert(0x10, no_lines),
            Err(QspiError::InvalidCommand { code: 0x10, .. })
        ));

        let three_lines = CommandAttributes::bare("odd")
            .with_read_data(LineMask::DQ0 | LineMask::DQ1 | LineMask::DQ2);
        assert!(table.insert(0x11, three_lines).is_err());

        // Empty mask is fine when the phase is absent
        assert!(table.insert(0x12, CommandAttributes::bare("ok")).is_ok());
        assert!(table.is_valid(0x12));
    }

    #[test]
    fn test_line_mask_helpers() {
        assert_eq!(LineMask::line(2), LineMask::DQ2);
        assert_eq!(LineMask::QUAD.line_count(), 4);
        assert_eq!(LineMask::DUAL.bits(), 0x03);
        assert_eq!(LineMask::QUAD.bits(), 0x0F);
    }
}
