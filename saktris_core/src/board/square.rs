use std::{
    fmt::{Debug, Display, Write},
    str::FromStr,
};

use paste::paste;
use seq_macro::seq;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A square on the board.
///
/// Internally a square is an integer from 0-63, ordered by increasing file
/// then rank, so that 0 is a1, 1 is b1, ... 7 is h1, 8 is a2, etc. Rank 0 is
/// White's back rank and rank 7 is Black's.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Square(u8);

impl Square {
    /// Construct a [`Square`] from the provided file and rank.
    ///
    /// Files are numbered 0-7 with 0 being file A and 7 being file H. Ranks
    /// are numbered 0-7 with 0 being rank 1 and 7 being rank 8.
    ///
    /// Returns [`None`] if either `file` or `rank` are greater than 7.
    pub const fn new(file: u8, rank: u8) -> Option<Self> {
        if file >= 8 || rank >= 8 {
            None
        } else {
            Some(Self(8 * rank + file))
        }
    }

    /// Construct a [`Square`] from the provided file and rank, without
    /// checking if they are valid. The result is truncated to 0-63, so the
    /// square is always valid -- just likely not the one you wanted if the
    /// inputs were out of range.
    pub const fn new_unchecked(file: u8, rank: u8) -> Self {
        Self(rank.overflowing_mul(8).0.overflowing_add(file).0 % 64)
    }

    /// Construct a [`Square`] from the provided index (0 is a1, 63 is h8).
    /// Values outside 0-63 return [`None`].
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < 64 {
            Some(Self(index as _))
        } else {
            None
        }
    }

    /// Construct a [`Square`] from the provided [`u8`], truncating values
    /// outside 0-63 into range.
    pub const fn from_u8_unchecked(value: u8) -> Self {
        Self(value % 64)
    }

    /// Returns the index of this square as a [`u8`].
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Returns the index of this square as a [`usize`].
    pub const fn index(self) -> usize {
        self.0 as _
    }

    /// Returns the file of this square, 0 being file A and 7 being file H.
    pub const fn file(self) -> u8 {
        self.0 % 8
    }

    /// Returns the rank of this square, 0 being rank 1 and 7 being rank 8.
    pub const fn rank(self) -> u8 {
        self.0 / 8
    }

    /// Returns the color parity of this square (0 for dark, 1 for light).
    ///
    /// Two squares with equal parity are the same color. Bishop placement
    /// legality is decided by this value.
    pub const fn parity(self) -> u8 {
        (self.file() + self.rank()) % 2
    }

    /// Returns an iterator over every single square, a1 through h8.
    pub fn all() -> impl Iterator<Item = Square> {
        (0..64).map(Square)
    }

    /// Offsets this square by a file and rank delta, returning [`None`] if
    /// the result falls off the board.
    ///
    /// This is the primitive the ray-scanning move generation walks with;
    /// unlike raw index arithmetic it can never wrap around a board edge.
    pub const fn try_offset(self, file_delta: i8, rank_delta: i8) -> Option<Self> {
        let file = self.file() as i8 + file_delta;
        let rank = self.rank() as i8 + rank_delta;

        if file < 0 || file >= 8 || rank < 0 || rank >= 8 {
            None
        } else {
            Some(Self::new_unchecked(file as u8, rank as u8))
        }
    }
}

impl Display for Square {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_char((self.file() + b'a') as _)?;
        f.write_char((self.rank() + b'1') as _)
    }
}

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
#[error("invalid square")]
pub struct ParseSquareError;

impl FromStr for Square {
    type Err = ParseSquareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut char_iter = s.chars();
        let file = char_iter.next().ok_or(ParseSquareError)?;
        let rank = char_iter.next().ok_or(ParseSquareError)?;
        if char_iter.next().is_some() {
            return Err(ParseSquareError);
        }

        let file = (file as i32) - ('a' as i32);
        let rank = (rank as i32) - ('1' as i32);
        if (0..8).contains(&file) && (0..8).contains(&rank) {
            Ok(Square::new_unchecked(file as _, rank as _))
        } else {
            Err(ParseSquareError)
        }
    }
}

/// Squares appear in save files and wire payloads in algebraic notation.
impl Serialize for Square {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Square {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(&s), &"a square like \"e4\""))
    }
}

/// Board square aliases
#[allow(clippy::eq_op, clippy::char_lit_as_u8)]
impl Square {
    seq!(RANK in 1..=8 {
        seq!(FILE in 'A'..='H' {
            paste! {
                pub const [<FILE RANK>]: Square = Square::new_unchecked(FILE as u8 - b'A', RANK - 1);
            }
        });
    });
}

impl Debug for Square {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "{}{}",
            (self.file() + b'A') as char,
            (self.rank() + b'1') as char
        ))
    }
}
