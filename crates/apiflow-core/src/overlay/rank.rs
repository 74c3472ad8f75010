//! Lexicographic rank strings.
//!
//! Ranks are base-36 digit strings (`0-9a-z`) compared bytewise. A rank
//! never ends in `0`, which guarantees a rank strictly between any two
//! distinct ranks always exists. Moves pick a midpoint; when a midpoint
//! grows past [`MAX_RANK_LEN`] the list is rebalanced with [`spread`].

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const BASE: usize = 36;

/// Longest rank produced before the caller must rebalance.
pub const MAX_RANK_LEN: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RankError {
    #[error("rank bounds out of order: '{low}' >= '{high}'")]
    OutOfOrder { low: String, high: String },

    #[error("invalid rank '{0}'")]
    Invalid(String),

    #[error("rank precision exhausted")]
    Exhausted,
}

fn digit(c: u8) -> Option<usize> {
    ALPHABET.iter().position(|&d| d == c)
}

fn validate(rank: &str) -> Result<(), RankError> {
    if rank.ends_with('0') || rank.bytes().any(|b| digit(b).is_none()) {
        return Err(RankError::Invalid(rank.to_string()));
    }
    Ok(())
}

/// A rank strictly between `low` and `high`.
///
/// `None` bounds are open: `between(None, None)` is the first rank of an
/// empty list, `between(Some(last), None)` appends.
pub fn between(low: Option<&str>, high: Option<&str>) -> Result<String, RankError> {
    let low = low.unwrap_or("");
    validate(low)?;
    if let Some(high) = high {
        validate(high)?;
        if high.is_empty() || low >= high {
            return Err(RankError::OutOfOrder {
                low: low.to_string(),
                high: high.to_string(),
            });
        }
    }

    let bytes = midpoint(low.as_bytes(), high.map(str::as_bytes));
    if bytes.len() > MAX_RANK_LEN {
        return Err(RankError::Exhausted);
    }
    // Every byte comes from ALPHABET.
    Ok(bytes.into_iter().map(char::from).collect())
}

fn midpoint(low: &[u8], high: Option<&[u8]>) -> Vec<u8> {
    if let Some(high) = high {
        // Copy the shared prefix (low is implicitly padded with '0').
        let mut n = 0;
        while n < high.len() && low.get(n).copied().unwrap_or(b'0') == high[n] {
            n += 1;
        }
        if n > 0 {
            let mut out = high[..n].to_vec();
            out.extend(midpoint(low.get(n..).unwrap_or(&[]), Some(&high[n..])));
            return out;
        }
    }

    let d_low = low.first().and_then(|&c| digit(c)).unwrap_or(0);
    let d_high = high
        .and_then(|h| h.first())
        .and_then(|&c| digit(c))
        .unwrap_or(BASE);

    if d_high - d_low > 1 {
        return vec![ALPHABET[(d_low + d_high) / 2]];
    }

    match high {
        // A longer high bound can be truncated to its first digit.
        Some(h) if h.len() > 1 => vec![h[0]],
        _ => {
            let mut out = vec![ALPHABET[d_low]];
            out.extend(midpoint(low.get(1..).unwrap_or(&[]), None));
            out
        }
    }
}

/// `n` evenly spaced ranks in ascending order, used for seeding and
/// rebalancing.
pub fn spread(n: usize) -> Vec<String> {
    if n == 0 {
        return Vec::new();
    }

    // Leave roughly one digit of headroom between neighbours.
    let slots = (n as u128 + 1) * BASE as u128;
    let mut width = 2u32;
    while (BASE as u128).pow(width) < slots {
        width += 1;
    }
    let space = (BASE as u128).pow(width);
    let step = space / (n as u128 + 1);

    (1..=n as u128)
        .map(|i| {
            let mut value = i * step;
            let mut digits = vec![b'0'; width as usize];
            for slot in digits.iter_mut().rev() {
                *slot = ALPHABET[(value % BASE as u128) as usize];
                value /= BASE as u128;
            }
            while digits.last() == Some(&b'0') {
                digits.pop();
            }
            digits.into_iter().map(char::from).collect()
        })
        .collect()
}
