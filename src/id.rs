//! Opaque external identifiers.
//!
//! Internal numeric keys are exposed as short salted strings using the
//! hashids scheme, so ids produced here interoperate with other hashids
//! implementations given the same salt, alphabet and minimum length.

use crate::error::{AppError, AppResult};

pub const DEFAULT_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ1234567890";
const DEFAULT_SEPARATORS: &str = "cfhistuCFHISTU";
const MIN_ALPHABET_LENGTH: usize = 16;
const SEPARATOR_DIV: f64 = 3.5;
const GUARD_DIV: f64 = 12.0;

/// Reversible, salted encoding of non-negative integers.
#[derive(Debug, Clone)]
pub struct IdCodec {
    salt: Vec<char>,
    min_length: usize,
    alphabet: Vec<char>,
    separators: Vec<char>,
    guards: Vec<char>,
}

impl IdCodec {
    /// Codec over the default alphabet.
    pub fn new(salt: &str, min_length: usize) -> AppResult<Self> {
        Self::with_alphabet(salt, min_length, DEFAULT_ALPHABET)
    }

    pub fn with_alphabet(salt: &str, min_length: usize, alphabet: &str) -> AppResult<Self> {
        let salt: Vec<char> = salt.chars().collect();
        let mut alphabet = unique(alphabet.chars());

        if alphabet.len() < MIN_ALPHABET_LENGTH {
            return Err(AppError::invalid_input(format!(
                "id alphabet must contain at least {MIN_ALPHABET_LENGTH} unique characters"
            )));
        }
        if alphabet.iter().any(|c| c.is_whitespace()) {
            return Err(AppError::invalid_input("id alphabet cannot contain whitespace"));
        }

        let mut separators: Vec<char> = unique(DEFAULT_SEPARATORS.chars())
            .into_iter()
            .filter(|c| alphabet.contains(c))
            .collect();
        alphabet.retain(|c| !separators.contains(c));
        shuffle(&mut separators, &salt);

        if separators.is_empty() || alphabet.len() as f64 / separators.len() as f64 > SEPARATOR_DIV
        {
            let mut wanted = (alphabet.len() as f64 / SEPARATOR_DIV).ceil() as usize;
            if wanted == 1 {
                wanted += 1;
            }
            if wanted > separators.len() {
                let diff = wanted - separators.len();
                separators.extend(alphabet.drain(..diff));
            } else {
                separators.truncate(wanted);
            }
        }

        shuffle(&mut alphabet, &salt);

        let guard_count = (alphabet.len() as f64 / GUARD_DIV).ceil() as usize;
        let guards = if alphabet.len() < 3 {
            separators.drain(..guard_count).collect()
        } else {
            alphabet.drain(..guard_count).collect()
        };

        Ok(Self {
            salt,
            min_length,
            alphabet,
            separators,
            guards,
        })
    }

    pub fn encode(&self, id: u64) -> String {
        self.encode_all(&[id])
    }

    /// Decode a single id; fails unless `input` is exactly what
    /// [`encode`](Self::encode) produces for some number.
    pub fn decode(&self, input: &str) -> AppResult<u64> {
        match self.decode_all(input)?.as_slice() {
            [id] => Ok(*id),
            other => Err(AppError::decode(
                input,
                format!("expected one number, found {}", other.len()),
            )),
        }
    }

    /// Encode several numbers into one id. Empty input yields an empty id.
    pub fn encode_all(&self, numbers: &[u64]) -> String {
        if numbers.is_empty() {
            return String::new();
        }

        let numbers_hash = numbers
            .iter()
            .enumerate()
            .fold(0u64, |acc, (i, n)| acc.wrapping_add(n % (i as u64 + 100)));

        let mut alphabet = self.alphabet.clone();
        let lottery = alphabet[(numbers_hash % alphabet.len() as u64) as usize];
        let mut ret = vec![lottery];

        for (i, &number) in numbers.iter().enumerate() {
            let buffer = self.shuffle_key(lottery, &alphabet);
            shuffle(&mut alphabet, &buffer);
            let last = to_alphabet(number, &alphabet);
            ret.extend_from_slice(&last);

            if i + 1 < numbers.len() {
                let seed = last[0] as u64 + i as u64;
                let index = (number % seed) % self.separators.len() as u64;
                ret.push(self.separators[index as usize]);
            }
        }

        if ret.len() < self.min_length {
            let index = (numbers_hash + ret[0] as u64) % self.guards.len() as u64;
            ret.insert(0, self.guards[index as usize]);

            if ret.len() < self.min_length {
                let index = (numbers_hash + ret[2] as u64) % self.guards.len() as u64;
                ret.push(self.guards[index as usize]);
            }
        }

        let half = alphabet.len() / 2;
        while ret.len() < self.min_length {
            let key = alphabet.clone();
            shuffle(&mut alphabet, &key);

            let mut padded = alphabet[half..].to_vec();
            padded.extend_from_slice(&ret);
            padded.extend_from_slice(&alphabet[..half]);
            ret = padded;

            let excess = ret.len().saturating_sub(self.min_length);
            if excess > 0 {
                let start = excess / 2;
                ret = ret[start..start + self.min_length].to_vec();
            }
        }

        ret.into_iter().collect()
    }

    /// Decode every number in `input`.
    pub fn decode_all(&self, input: &str) -> AppResult<Vec<u64>> {
        let chars: Vec<char> = input.chars().collect();
        if chars.is_empty() {
            return Err(AppError::decode(input, "empty identifier"));
        }
        if let Some(c) = chars.iter().find(|&c| {
            !self.alphabet.contains(c) && !self.guards.contains(c) && !self.separators.contains(c)
        }) {
            return Err(AppError::decode(input, format!("unexpected character '{c}'")));
        }

        let sections: Vec<&[char]> = chars.split(|c| self.guards.contains(c)).collect();
        let body = match sections.len() {
            2 | 3 => sections[1],
            _ => sections[0],
        };
        let Some((&lottery, rest)) = body.split_first() else {
            return Err(AppError::decode(input, "missing payload"));
        };

        let mut alphabet = self.alphabet.clone();
        let mut numbers = Vec::new();
        for chunk in rest.split(|c| self.separators.contains(c)) {
            let buffer = self.shuffle_key(lottery, &alphabet);
            shuffle(&mut alphabet, &buffer);
            let number = from_alphabet(chunk, &alphabet)
                .ok_or_else(|| AppError::decode(input, "number out of range"))?;
            numbers.push(number);
        }

        // Anything but the canonical spelling of these numbers is foreign.
        if self.encode_all(&numbers) != input {
            return Err(AppError::decode(input, "not produced by this codec"));
        }
        Ok(numbers)
    }

    /// `lottery + salt + alphabet`, cut to the alphabet length.
    fn shuffle_key(&self, lottery: char, alphabet: &[char]) -> Vec<char> {
        std::iter::once(lottery)
            .chain(self.salt.iter().copied())
            .chain(alphabet.iter().copied())
            .take(alphabet.len())
            .collect()
    }
}

fn unique(chars: impl Iterator<Item = char>) -> Vec<char> {
    let mut out: Vec<char> = Vec::new();
    for c in chars {
        if !out.contains(&c) {
            out.push(c);
        }
    }
    out
}

/// Deterministic salt-driven permutation.
fn shuffle(chars: &mut [char], salt: &[char]) {
    if salt.is_empty() {
        return;
    }
    let mut p = 0usize;
    let mut v = 0usize;
    for i in (1..chars.len()).rev() {
        v %= salt.len();
        let code = salt[v] as usize;
        p += code;
        let j = (code + v + p) % i;
        chars.swap(i, j);
        v += 1;
    }
}

fn to_alphabet(mut number: u64, alphabet: &[char]) -> Vec<char> {
    let base = alphabet.len() as u64;
    let mut out = Vec::new();
    loop {
        out.push(alphabet[(number % base) as usize]);
        number /= base;
        if number == 0 {
            break;
        }
    }
    out.reverse();
    out
}

fn from_alphabet(chunk: &[char], alphabet: &[char]) -> Option<u64> {
    let base = alphabet.len() as u64;
    chunk.iter().try_fold(0u64, |acc, c| {
        let digit = alphabet.iter().position(|a| a == c)? as u64;
        acc.checked_mul(base)?.checked_add(digit)
    })
}
