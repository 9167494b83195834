use foundation::coords::WorldPosition;
use tracing::warn;

use crate::SheetError;

// Expected bounds for decoded look tokens. The i/j bounds are asymmetric;
// they are carried over verbatim from the upstream data convention and are
// warning-only.
const MAX_I: i64 = 100;
const MAX_J: i64 = 200;
const MAX_LOCAL: i64 = 63;

/// Decodes a compact "look" string such as `"(10, 20, 5, 6)"` into a world
/// position on the given plane.
///
/// The string encodes `(i, j, x, y, ...)` as embedded decimal runs; the
/// world coordinate is `((i << 6) | x, (j << 6) | y)`. Fewer than four runs
/// or a run too long to accumulate is an error; extra runs and
/// out-of-bounds values only log warnings and keep best-effort values.
pub fn parse_look(look: &str, plane: i32) -> Result<WorldPosition, SheetError> {
    let tokens = decimal_runs(look).ok_or_else(|| SheetError::MalformedCoordinate {
        raw: look.to_string(),
    })?;
    if tokens.len() < 4 {
        return Err(SheetError::MalformedCoordinate {
            raw: look.to_string(),
        });
    }
    if tokens.len() > 4 {
        warn!(look, count = tokens.len(), "look string has extra tokens");
    }

    let (i, j, x, y) = (tokens[0], tokens[1], tokens[2], tokens[3]);
    if i > MAX_I || j > MAX_J {
        warn!(look, i, j, "look square out of expected bounds");
    }
    if x > MAX_LOCAL || y > MAX_LOCAL {
        warn!(look, x, y, "look offset out of expected bounds");
    }

    Ok(WorldPosition::new(
        plane,
        ((i << 6) | x) as i32,
        ((j << 6) | y) as i32,
    ))
}

/// Parses a plane cell (a bare integer such as `"0"`).
pub fn parse_plane(raw: &str) -> Result<i32, SheetError> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| SheetError::MalformedPlane {
            raw: raw.to_string(),
        })
}

/// Extracts every maximal run of ascii digits from `raw`, in order.
/// `None` when a run overflows the accumulator; cell content is remote
/// data, so overflow must stay an ordinary parse failure.
fn decimal_runs(raw: &str) -> Option<Vec<i64>> {
    let mut runs = Vec::new();
    let mut current: Option<i64> = None;
    for ch in raw.chars() {
        match ch.to_digit(10) {
            Some(d) => {
                let run = current
                    .unwrap_or(0)
                    .checked_mul(10)?
                    .checked_add(d as i64)?;
                current = Some(run);
            }
            None => {
                if let Some(run) = current.take() {
                    runs.push(run);
                }
            }
        }
    }
    if let Some(run) = current {
        runs.push(run);
    }
    Some(runs)
}

#[cfg(test)]
mod tests {
    use foundation::coords::WorldPosition;

    use super::{parse_look, parse_plane};

    #[test]
    fn decodes_four_token_look() {
        let pos = parse_look("(10, 20, 5, 6)", 0).unwrap();
        assert_eq!(pos, WorldPosition::new(0, (10 << 6) | 5, (20 << 6) | 6));
    }

    #[test]
    fn too_few_tokens_is_an_error() {
        assert!(parse_look("(10, 20, 5)", 0).is_err());
        assert!(parse_look("", 0).is_err());
    }

    #[test]
    fn overlong_digit_run_is_an_error_not_a_panic() {
        assert!(parse_look("(99999999999999999999, 1, 1, 1)", 0).is_err());
        assert!(parse_look("(1, 1, 1, 170141183460469231731687303715884105727)", 0).is_err());
    }

    #[test]
    fn extra_tokens_keep_first_four() {
        let pos = parse_look("1,2,3,4,5", 1).unwrap();
        assert_eq!(pos, WorldPosition::new(1, (1 << 6) | 3, (2 << 6) | 4));
    }

    #[test]
    fn out_of_bounds_values_are_kept() {
        // Warning-only heuristic; the decoded value survives.
        let pos = parse_look("(120, 250, 70, 70)", 0).unwrap();
        assert_eq!(pos.x, (120 << 6) | 70);
        assert_eq!(pos.y, (250 << 6) | 70);
    }

    #[test]
    fn plane_cell_parses_or_errors() {
        assert_eq!(parse_plane(" 3 ").unwrap(), 3);
        assert!(parse_plane("-").is_err());
    }
}
