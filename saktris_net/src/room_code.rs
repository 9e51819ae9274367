//! Six-character room codes. The alphabet excludes the characters that
//! read ambiguously over voice or handwriting (I, O, 0, 1).

use rand::Rng;
use thiserror::Error;

pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const ROOM_CODE_LEN: usize = 6;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomCodeError {
    #[error("room code must be exactly {ROOM_CODE_LEN} characters")]
    WrongLength,
    #[error("room code contains disallowed character {0:?}")]
    DisallowedCharacter(char),
}

pub fn generate_room_code(rng: &mut impl Rng) -> String {
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

pub fn validate_room_code(code: &str) -> Result<(), RoomCodeError> {
    if code.len() != ROOM_CODE_LEN {
        return Err(RoomCodeError::WrongLength);
    }

    for c in code.chars() {
        if !ROOM_CODE_ALPHABET.contains(&(c as u8)) {
            return Err(RoomCodeError::DisallowedCharacter(c));
        }
    }

    Ok(())
}
