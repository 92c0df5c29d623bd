//! Compute Budget program instructions.

use crate::address::Pubkey;
use crate::transaction::Instruction;

/// Compute Budget Program ID: `ComputeBudget111111111111111111111111111111`
pub const COMPUTE_BUDGET_PROGRAM_ID: Pubkey = Pubkey::new([
    0x03, 0x06, 0x46, 0x6f, 0xe5, 0x21, 0x17, 0x32, 0xff, 0xec, 0xad, 0xba, 0x72, 0xc3, 0x9b,
    0xe7, 0xbc, 0x8c, 0xe5, 0xbb, 0xc5, 0xf7, 0x12, 0x6b, 0x2c, 0x43, 0x9b, 0x3a, 0x40, 0x00,
    0x00, 0x00,
]);

/// `SetComputeUnitLimit` discriminator.
pub const SET_COMPUTE_UNIT_LIMIT_IX: u8 = 2;

/// `SetComputeUnitPrice` discriminator.
pub const SET_COMPUTE_UNIT_PRICE_IX: u8 = 3;

/// Build a `SetComputeUnitLimit` instruction (1-byte tag + u32 LE units).
pub fn set_compute_unit_limit(units: u32) -> Instruction {
    Instruction {
        program_id: COMPUTE_BUDGET_PROGRAM_ID,
        accounts: vec![],
        data: encode_compute_unit_limit(units),
    }
}

/// Build a `SetComputeUnitPrice` instruction (1-byte tag + u64 LE micro-lamports).
pub fn set_compute_unit_price(micro_lamports: u64) -> Instruction {
    let mut data = Vec::with_capacity(9);
    data.push(SET_COMPUTE_UNIT_PRICE_IX);
    data.extend_from_slice(&micro_lamports.to_le_bytes());
    Instruction {
        program_id: COMPUTE_BUDGET_PROGRAM_ID,
        accounts: vec![],
        data,
    }
}

pub fn encode_compute_unit_limit(units: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(5);
    data.push(SET_COMPUTE_UNIT_LIMIT_IX);
    data.extend_from_slice(&units.to_le_bytes());
    data
}

/// Read the unit limit out of a `SetComputeUnitLimit` payload.
///
/// Returns `None` for any other payload shape.
pub fn decode_compute_unit_limit(data: &[u8]) -> Option<u32> {
    match data {
        [SET_COMPUTE_UNIT_LIMIT_IX, a, b, c, d] => Some(u32::from_le_bytes([*a, *b, *c, *d])),
        _ => None,
    }
}

/// Raise the limit encoded in a `SetComputeUnitLimit` payload by `percent`.
///
/// The new limit is `floor(limit * (100 + percent) / 100)`, saturating at
/// `u32::MAX`. Returns `None` if `data` is not such a payload.
pub fn bump_compute_unit_limit(data: &[u8], percent: u32) -> Option<(u32, u32)> {
    let current = decode_compute_unit_limit(data)?;
    let scaled = u64::from(current) * (100 + u64::from(percent)) / 100;
    let bumped = u32::try_from(scaled).unwrap_or(u32::MAX);
    Some((current, bumped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_id_matches_base58() {
        assert_eq!(
            COMPUTE_BUDGET_PROGRAM_ID.to_string(),
            "ComputeBudget111111111111111111111111111111"
        );
    }

    #[test]
    fn limit_payload_is_five_bytes() {
        let ix = set_compute_unit_limit(200_000);
        assert_eq!(ix.data.len(), 5);
        assert_eq!(ix.data[0], 2);
        assert_eq!(decode_compute_unit_limit(&ix.data), Some(200_000));
    }

    #[test]
    fn price_payload_is_not_a_limit() {
        let ix = set_compute_unit_price(5_000);
        assert_eq!(ix.data.len(), 9);
        assert_eq!(decode_compute_unit_limit(&ix.data), None);
    }

    #[test]
    fn heap_frame_request_is_not_a_limit() {
        // RequestHeapFrame shares the 5-byte shape but uses tag 1.
        let data = [1u8, 0, 0, 1, 0];
        assert_eq!(bump_compute_unit_limit(&data, 20), None);
    }

    #[test]
    fn bump_truncates() {
        assert_eq!(
            bump_compute_unit_limit(&encode_compute_unit_limit(200_000), 20),
            Some((200_000, 240_000))
        );
        // 7 * 120 / 100 = 8.4 -> 8
        assert_eq!(
            bump_compute_unit_limit(&encode_compute_unit_limit(7), 20),
            Some((7, 8))
        );
    }

    #[test]
    fn bump_saturates() {
        assert_eq!(
            bump_compute_unit_limit(&encode_compute_unit_limit(u32::MAX), 20),
            Some((u32::MAX, u32::MAX))
        );
    }
}
