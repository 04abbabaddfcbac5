//! Secure random password generator

use crate::{Result, VaultError};
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const NUMBERS: &[u8] = b"0123456789";
/// All 32 printable ASCII punctuation characters
const SYMBOLS: &[u8] = b"!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

const MIN_LENGTH: usize = 4;
const MAX_LENGTH: usize = 128;

/// Character-class policy for password generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordOptions {
    /// Length of the password to generate
    pub length: usize,
    /// Include uppercase letters
    pub uppercase: bool,
    /// Include lowercase letters
    pub lowercase: bool,
    /// Include digits
    pub numbers: bool,
    /// Include symbols
    pub symbols: bool,
}

impl Default for PasswordOptions {
    fn default() -> Self {
        Self {
            length: 20,
            uppercase: true,
            lowercase: true,
            numbers: true,
            symbols: true,
        }
    }
}

impl PasswordOptions {
    /// Set the password length
    pub fn length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    /// Include uppercase letters
    pub fn with_uppercase(mut self, include: bool) -> Self {
        self.uppercase = include;
        self
    }

    /// Include lowercase letters
    pub fn with_lowercase(mut self, include: bool) -> Self {
        self.lowercase = include;
        self
    }

    /// Include digits
    pub fn with_numbers(mut self, include: bool) -> Self {
        self.numbers = include;
        self
    }

    /// Include symbols
    pub fn with_symbols(mut self, include: bool) -> Self {
        self.symbols = include;
        self
    }

    /// Enabled character classes, in a fixed order
    fn classes(&self) -> Vec<&'static [u8]> {
        let mut classes = Vec::with_capacity(4);
        if self.uppercase {
            classes.push(UPPERCASE);
        }
        if self.lowercase {
            classes.push(LOWERCASE);
        }
        if self.numbers {
            classes.push(NUMBERS);
        }
        if self.symbols {
            classes.push(SYMBOLS);
        }
        classes
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(MIN_LENGTH..=MAX_LENGTH).contains(&self.length) {
            return Err(VaultError::InvalidInput(format!(
                "Password length must be between {} and {} characters",
                MIN_LENGTH, MAX_LENGTH
            )));
        }
        Ok(())
    }
}

/// Generate a random password.
///
/// The result holds at least one character of every enabled class. With no
/// class enabled it falls back to lowercase letters.
pub fn generate_password(options: &PasswordOptions) -> Result<String> {
    options.validate()?;

    let mut classes = options.classes();
    if classes.is_empty() {
        classes.push(LOWERCASE);
    }

    let pool: Vec<u8> = classes.iter().flat_map(|c| c.iter().copied()).collect();
    let mut rng = OsRng;

    let mut password = Vec::with_capacity(options.length);
    for class in &classes {
        if let Some(&c) = class.choose(&mut rng) {
            password.push(c);
        }
    }
    while password.len() < options.length {
        if let Some(&c) = pool.choose(&mut rng) {
            password.push(c);
        }
    }

    // Shuffle so the required characters do not sit at the front
    password.shuffle(&mut rng);

    Ok(password.into_iter().map(char::from).collect())
}

/// Estimated entropy in bits: `floor(length * log2(pool size))`
pub fn calculate_entropy(options: &PasswordOptions) -> u32 {
    let pool_size: usize = options.classes().iter().map(|c| c.len()).sum();
    if pool_size == 0 {
        return 0;
    }
    (options.length as f64 * (pool_size as f64).log2()).floor() as u32
}

/// Human-readable strength bucket for an entropy value
pub fn strength_label(entropy: u32) -> &'static str {
    match entropy {
        0..=39 => "Weak",
        40..=59 => "Fair",
        60..=79 => "Strong",
        _ => "Very Strong",
    }
}
