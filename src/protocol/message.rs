//! Application protocol messages.
//!
//! Everything above the WebSocket layer is plain UTF-8 text with
//! space-separated fields:
//!
//! | Message | Format | Direction |
//! |---------|--------|-----------|
//! | Reset | `"<size>"` | client → `/reset/` |
//! | Subscribe | `"<row> <col>"` | worker → server |
//! | Subscribe done | `"sub"` | worker → server |
//! | Begin subscribing | `"sub"` | server → worker |
//! | Begin running | `"run"` | server → worker |
//! | Generation update | `"<step> <row> <col> <0|1>"` | both ways |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Token marking the end of a worker's subscriptions, and the server's
/// permission to begin subscribing.
pub const TOKEN_SUB: &str = "sub";

/// Server's permission to begin the simulation.
pub const TOKEN_RUN: &str = "run";

// ============================================================================
// Update
// ============================================================================

/// One generation update: `"<step> <row> <col> <0|1>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Update {
    /// Generation number.
    pub step: u64,
    /// Cell row.
    pub row: u16,
    /// Cell column.
    pub col: u16,
    /// Alive flag.
    pub alive: bool,
}

impl Update {
    /// Parses a generation update.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sequencing`] for anything that is not four
    /// space-separated fields with an alive flag of `0` or `1`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut fields = text.split_ascii_whitespace();
        let (step, row, col, alive) = match (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) {
            (Some(step), Some(row), Some(col), Some(alive), None) => (step, row, col, alive),
            _ => return Err(Error::sequencing(format!("malformed update {text:?}"))),
        };

        let parse_err = || Error::sequencing(format!("malformed update {text:?}"));
        Ok(Self {
            step: step.parse().map_err(|_| parse_err())?,
            row: row.parse().map_err(|_| parse_err())?,
            col: col.parse().map_err(|_| parse_err())?,
            alive: match alive {
                "0" => false,
                "1" => true,
                _ => return Err(parse_err()),
            },
        })
    }

    /// Returns the cell coordinate.
    #[inline]
    #[must_use]
    pub const fn coord(&self) -> (u16, u16) {
        (self.row, self.col)
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.step,
            self.row,
            self.col,
            u8::from(self.alive)
        )
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// One message of the worker's subscribe phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    /// `"<row> <col>"`: deliver that coordinate's updates to me.
    Coord {
        /// Neighbor row.
        row: u16,
        /// Neighbor column.
        col: u16,
    },
    /// `"sub"`: all subscriptions sent.
    Done,
}

impl Subscription {
    /// Parses a subscribe-phase message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sequencing`] for anything that is neither a
    /// coordinate pair nor the literal `"sub"`.
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim() == TOKEN_SUB {
            return Ok(Self::Done);
        }
        let mut fields = text.split_ascii_whitespace();
        match (fields.next(), fields.next(), fields.next()) {
            (Some(row), Some(col), None) => {
                let parse_err = || Error::unexpected_token("<row> <col>", text);
                Ok(Self::Coord {
                    row: row.parse().map_err(|_| parse_err())?,
                    col: col.parse().map_err(|_| parse_err())?,
                })
            }
            _ => Err(Error::unexpected_token("<row> <col>", text)),
        }
    }
}

// ============================================================================
// Reset
// ============================================================================

/// Parses a reset control message: the grid edge length.
///
/// # Errors
///
/// Returns [`Error::Sequencing`] unless the message is a positive
/// integer.
pub fn parse_grid_size(text: &str) -> Result<u16> {
    match text.trim().parse::<u16>() {
        Ok(size) if size > 0 => Ok(size),
        _ => Err(Error::sequencing(format!("invalid grid size {text:?}"))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_round_trip() {
        let update = Update {
            step: 12,
            row: 3,
            col: 31,
            alive: true,
        };
        assert_eq!(update.to_string(), "12 3 31 1");
        assert_eq!(Update::parse("12 3 31 1").unwrap(), update);
    }

    #[test]
    fn test_update_dead_cell() {
        let update = Update::parse("0 0 0 0").unwrap();
        assert!(!update.alive);
        assert_eq!(update.coord(), (0, 0));
    }

    #[test]
    fn test_update_rejects_garbage() {
        for text in ["", "1 2 3", "1 2 3 4 5", "a b c d", "1 2 3 2", "sub"] {
            assert!(Update::parse(text).is_err(), "{text:?}");
        }
    }

    #[test]
    fn test_subscription_coord() {
        assert_eq!(
            Subscription::parse("4 7").unwrap(),
            Subscription::Coord { row: 4, col: 7 }
        );
    }

    #[test]
    fn test_subscription_done() {
        assert_eq!(Subscription::parse("sub").unwrap(), Subscription::Done);
    }

    #[test]
    fn test_subscription_rejects_garbage() {
        for text in ["", "run", "1", "1 2 3", "x y"] {
            assert!(Subscription::parse(text).is_err(), "{text:?}");
        }
    }

    #[test]
    fn test_parse_grid_size() {
        assert_eq!(parse_grid_size("32").unwrap(), 32);
        assert_eq!(parse_grid_size(" 5 ").unwrap(), 5);
        assert!(parse_grid_size("0").is_err());
        assert!(parse_grid_size("-3").is_err());
        assert!(parse_grid_size("lots").is_err());
    }
}
