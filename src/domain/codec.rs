//! Identifier ↔ public code codec.
//!
//! Two encoding generations coexist:
//!
//! - **legacy**: Feistel-scramble the id, base-62 encode, left-pad to a fixed
//!   minimum length. Constant-looking length, issued since day one.
//! - **compact**: for ids at or past a configured cutover, an affine
//!   permutation mod 62^L produces the shortest L-digit code that fits,
//!   marked with a reserved prefix.
//!
//! The generation is a tagged choice resolved once per call: by identifier
//! threshold on encode, by prefix match on decode. Codes never overlap in
//! meaning because the prefix is reserved for the compact generation;
//! keeping the legacy alphabet free of the prefix is an operational
//! responsibility, not enforced here.

use crate::domain::affine::{AffineParams, MAX_SUPPORTED_LENGTH};
use crate::domain::base62;
use crate::domain::error::{CodeError, ConfigError};
use crate::domain::feistel::Feistel64;

/// Configuration for the compact (variable-length, prefixed) generation.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct CompactConfig {
    /// Whether the compact generation is used for new ids at all.
    pub enabled: bool,
    /// Reserved marker prepended to every compact code.
    pub prefix: String,
    /// Smallest code body length to issue.
    pub min_length: usize,
    /// Largest code body length to issue (at most 10).
    pub max_length: usize,
    /// First identifier encoded with the compact generation (unsigned
    /// comparison). Ids below it keep using the legacy scheme.
    pub start_id: u64,
    /// Derivation key for the affine coefficients. May differ from the
    /// legacy scramble key.
    pub key: String,
}

impl Default for CompactConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            prefix: "_".to_string(),
            min_length: 5,
            max_length: 10,
            start_id: u64::MAX,
            key: String::new(),
        }
    }
}

/// Full codec configuration.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct CodecConfig {
    /// Secret key the legacy Feistel round keys are derived from.
    pub key: String,
    /// Feistel round count, in [3, 10].
    pub rounds: u32,
    /// Minimum (left-padded) length of legacy codes.
    pub min_length: usize,
    /// Compact generation settings.
    #[cfg_attr(feature = "serde", serde(default))]
    pub compact: CompactConfig,
}

/// Affine parameters and routing state for the compact generation,
/// derived once at construction.
#[derive(Debug, Clone)]
struct CompactState {
    prefix: String,
    min_length: usize,
    max_length: usize,
    start_id: u64,
    /// Parameter sets for lengths `min_length..=max_length`, in order.
    params: Vec<AffineParams>,
}

impl CompactState {
    fn params_for(&self, length: usize) -> &AffineParams {
        &self.params[length - self.min_length]
    }
}

/// Bidirectional identifier/code codec over both generations.
///
/// All keyed state (round keys, affine parameters) is derived at
/// construction and immutable afterwards; a codec can be shared freely
/// across threads, and multiple codecs with different keys can coexist.
#[derive(Debug, Clone)]
pub struct IdCodec {
    feistel: Feistel64,
    min_length: usize,
    compact: Option<CompactState>,
}

impl IdCodec {
    /// Build a codec, validating the whole configuration up front.
    ///
    /// # Errors
    /// Any `ConfigError` is fatal: a process with an invalid codec
    /// configuration must not serve traffic.
    pub fn new(config: &CodecConfig) -> Result<Self, ConfigError> {
        let feistel = Feistel64::new(&config.key, config.rounds)?;
        if config.min_length == 0 {
            return Err(ConfigError::ZeroMinLength);
        }

        let compact = if config.compact.enabled {
            Some(Self::build_compact(&config.compact)?)
        } else {
            None
        };

        Ok(Self {
            feistel,
            min_length: config.min_length,
            compact,
        })
    }

    fn build_compact(cfg: &CompactConfig) -> Result<CompactState, ConfigError> {
        if cfg.prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        if cfg.key.trim().is_empty() {
            return Err(ConfigError::BlankKey);
        }
        if cfg.min_length == 0
            || cfg.min_length > cfg.max_length
            || cfg.max_length > MAX_SUPPORTED_LENGTH
        {
            return Err(ConfigError::BadLengthRange {
                min: cfg.min_length,
                max: cfg.max_length,
            });
        }

        let params = (cfg.min_length..=cfg.max_length)
            .map(|length| AffineParams::derive(&cfg.key, length))
            .collect();

        Ok(CompactState {
            prefix: cfg.prefix.clone(),
            min_length: cfg.min_length,
            max_length: cfg.max_length,
            start_id: cfg.start_id,
            params,
        })
    }

    /// Encode an identifier into its public code.
    ///
    /// Ids at or past the compact cutover get the shortest prefixed code
    /// whose length fits; everything else goes through the legacy scheme.
    pub fn encode(&self, id: u64) -> Result<String, CodeError> {
        if id == 0 {
            return Err(CodeError::ZeroId);
        }

        if let Some(compact) = &self.compact {
            if id >= compact.start_id {
                return Ok(self.encode_compact(compact, id));
            }
        }

        Ok(self.encode_legacy(id))
    }

    /// Decode a public code back into its identifier.
    ///
    /// The prefix routes to the compact generation; anything else is treated
    /// as legacy. All failures signal a malformed or forged code.
    pub fn decode(&self, code: &str) -> Result<u64, CodeError> {
        if code.trim().is_empty() {
            return Err(CodeError::Blank);
        }

        if let Some(compact) = &self.compact {
            if let Some(body) = code.strip_prefix(&compact.prefix) {
                return self.decode_compact(compact, body);
            }
        }

        self.decode_legacy(code)
    }

    fn encode_legacy(&self, id: u64) -> String {
        let scrambled = self.feistel.scramble(id);
        base62::encode_fixed(scrambled, self.min_length)
    }

    fn decode_legacy(&self, code: &str) -> Result<u64, CodeError> {
        let trimmed = trim_leading_zeros(code);
        let scrambled = base62::decode(trimmed)?;
        let id = self.feistel.unscramble(scrambled);
        if id == 0 {
            return Err(CodeError::ZeroId);
        }
        Ok(id)
    }

    fn encode_compact(&self, compact: &CompactState, id: u64) -> String {
        let Some(length) = pick_length(id, compact.min_length, compact.max_length) else {
            // The id exceeds 62^max_length. Construction validated the range,
            // so this only happens when the configured ceiling is below the
            // id space actually in use; fall back to the legacy scheme
            // rather than refuse to encode.
            tracing::warn!(
                id,
                max_length = compact.max_length,
                "id exceeds compact code capacity, falling back to legacy encoding"
            );
            return self.encode_legacy(id);
        };

        let params = compact.params_for(length);
        let y = params.permute(id as u128);
        // y < m = 62^length <= 62^10 < 2^63, so the cast is lossless.
        let body = base62::encode_fixed(y as u64, length);
        format!("{}{}", compact.prefix, body)
    }

    fn decode_compact(&self, compact: &CompactState, body: &str) -> Result<u64, CodeError> {
        let length = body.len();
        if length < compact.min_length || length > compact.max_length {
            return Err(CodeError::LengthOutOfRange {
                length,
                min: compact.min_length,
                max: compact.max_length,
            });
        }

        let y = base62::decode(body)?;
        let x = compact.params_for(length).invert(y as u128);
        if x == 0 {
            return Err(CodeError::ZeroId);
        }
        // x < m <= 62^10 < 2^64
        Ok(x as u64)
    }
}

/// Strip the left-padding zeros off a legacy code, keeping at least one
/// digit so `"000"` still decodes (to zero, which is then rejected).
fn trim_leading_zeros(s: &str) -> &str {
    let stripped = s.trim_start_matches('0');
    if stripped.is_empty() {
        &s[s.len() - 1..]
    } else {
        stripped
    }
}

/// Smallest length in `[min, max]` whose code space holds `id`, if any.
fn pick_length(id: u64, min: usize, max: usize) -> Option<usize> {
    (min..=max).find(|&length| (id as u128) < 62u128.pow(length as u32))
}
