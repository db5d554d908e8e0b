//! Minimal HID report-descriptor walk.
//!
//! `hidapi` has no call for "largest input report", so the hidapi backend reads the raw report
//! descriptor and sums `Report Size × Report Count` of every Input main item, per report ID.
//! Only the global items that affect sizing are tracked (Report Size, Report Count, Report ID,
//! Push, Pop); everything else is skipped.

use std::collections::BTreeMap;

const TYPE_MAIN: u8 = 0;
const TYPE_GLOBAL: u8 = 1;

const MAIN_INPUT: u8 = 0x8;

const GLOBAL_REPORT_SIZE: u8 = 0x7;
const GLOBAL_REPORT_ID: u8 = 0x8;
const GLOBAL_REPORT_COUNT: u8 = 0x9;
const GLOBAL_PUSH: u8 = 0xA;
const GLOBAL_POP: u8 = 0xB;

const LONG_ITEM_PREFIX: u8 = 0xFE;

/// Largest input report length taken at face value. Anything above is treated as unknown.
pub const MAX_INPUT_REPORT_LEN: usize = 64 * 1024;

#[derive(Clone, Copy, Default)]
struct Globals {
    report_size: u32,
    report_count: u32,
    report_id: u8,
}

/// Largest input report described by `descriptor`, in bytes, including one leading byte for
/// the report ID (hidapi reads always leave room for it). Returns `0` if the descriptor has no
/// input items or describes a report longer than [`MAX_INPUT_REPORT_LEN`].
pub fn max_input_report_len(descriptor: &[u8]) -> usize {
    let mut globals = Globals::default();
    let mut stack: Vec<Globals> = Vec::new();
    let mut input_bits: BTreeMap<u8, u64> = BTreeMap::new();

    let mut i = 0;
    while i < descriptor.len() {
        let prefix = descriptor[i];
        i += 1;

        if prefix == LONG_ITEM_PREFIX {
            // [0xFE][bDataSize][bLongItemTag][data...]
            let Some(&size) = descriptor.get(i) else { break };
            i += 2 + size as usize;
            continue;
        }

        let size = match prefix & 0x03 {
            3 => 4,
            n => n as usize,
        };
        let Some(data) = descriptor.get(i..i + size) else { break };
        i += size;

        let value = data
            .iter()
            .rev()
            .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
        let kind = (prefix >> 2) & 0x03;
        let tag = prefix >> 4;

        match (kind, tag) {
            (TYPE_GLOBAL, GLOBAL_REPORT_SIZE) => globals.report_size = value,
            (TYPE_GLOBAL, GLOBAL_REPORT_COUNT) => globals.report_count = value,
            (TYPE_GLOBAL, GLOBAL_REPORT_ID) => globals.report_id = value as u8,
            (TYPE_GLOBAL, GLOBAL_PUSH) => stack.push(globals),
            (TYPE_GLOBAL, GLOBAL_POP) => {
                if let Some(g) = stack.pop() {
                    globals = g;
                }
            }
            (TYPE_MAIN, MAIN_INPUT) => {
                let bits = u64::from(globals.report_size)
                    .saturating_mul(u64::from(globals.report_count));
                let total = input_bits.entry(globals.report_id).or_default();
                *total = total.saturating_add(bits);
            }
            _ => {}
        }
    }

    let Some(bits) = input_bits.values().max() else { return 0 };
    match usize::try_from(bits.div_ceil(8)) {
        Ok(bytes) if bytes < MAX_INPUT_REPORT_LEN => bytes + 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // FIDO-style descriptor: 64-byte input, 64-byte output, no report IDs.
    const FIDO: &[u8] = &[
        0x06, 0xD0, 0xF1, 0x09, 0x01, 0xA1, 0x01, 0x09, 0x20, 0x15, 0x00, 0x26, 0xFF, 0x00, 0x75,
        0x08, 0x95, 0x40, 0x81, 0x02, 0x09, 0x21, 0x15, 0x00, 0x26, 0xFF, 0x00, 0x75, 0x08, 0x95,
        0x40, 0x91, 0x02, 0xC0,
    ];

    #[test]
    fn single_input_report_plus_id_byte() {
        assert_eq!(max_input_report_len(FIDO), 65);
    }

    #[test]
    fn largest_report_id_wins() {
        let desc = [
            0x85, 0x01, // Report ID 1
            0x75, 0x01, 0x95, 0x08, 0x81, 0x02, // 8 bits
            0x85, 0x02, // Report ID 2
            0x75, 0x08, 0x95, 0x03, 0x81, 0x02, // 24 bits
            0x75, 0x01, 0x95, 0x04, 0x81, 0x03, // 4 bits padding
        ];
        // Report 2: 28 bits -> 4 bytes, + id.
        assert_eq!(max_input_report_len(&desc), 5);
    }

    #[test]
    fn push_pop_restore_sizes() {
        let desc = [
            0x75, 0x08, 0x95, 0x02, // 8 x 2
            0xA4, // Push
            0x75, 0x10, 0x95, 0x01, 0x91, 0x02, // output, ignored
            0xB4, // Pop
            0x81, 0x02, // input with 8 x 2
        ];
        assert_eq!(max_input_report_len(&desc), 3);
    }

    #[test]
    fn truncated_or_empty_descriptor_yields_zero() {
        assert_eq!(max_input_report_len(&[]), 0);
        assert_eq!(max_input_report_len(&[0x75]), 0);
        assert_eq!(max_input_report_len(&[0xFE, 0x10]), 0);
    }

    #[test]
    fn oversized_reports_are_treated_as_unknown() {
        let huge = [
            0x77, 0xFF, 0xFF, 0xFF, 0xFF, // Report Size 0xFFFFFFFF
            0x97, 0xFF, 0xFF, 0xFF, 0xFF, // Report Count 0xFFFFFFFF
            0x81, 0x02, 0x81, 0x02, // two inputs, saturating
        ];
        assert_eq!(max_input_report_len(&huge), 0);

        // 8 x 0x10000 = exactly the cap in bytes.
        let at_cap = [0x75, 0x08, 0x97, 0x00, 0x00, 0x01, 0x00, 0x81, 0x02];
        assert_eq!(max_input_report_len(&at_cap), 0);

        let below = [0x75, 0x08, 0x96, 0xFF, 0xFF, 0x81, 0x02];
        assert_eq!(max_input_report_len(&below), 0xFFFF + 1);
    }
}
