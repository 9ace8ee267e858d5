use anyhow::{anyhow, Result};
use std::path::Path;

/// Encoding half of the provider capability.
///
/// Token ids only need to be meaningful to the same tokenizer: the engine counts
/// them and decodes prefixes of them, nothing else.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    fn decode(&self, tokens: &[u32]) -> Result<String>;

    fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(self.encode(text)?.len())
    }
}

/// A [`Tokenizer`] backed by a HuggingFace `tokenizer.json`
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| anyhow!("Failed to load tokenizer {}: {}", path.display(), e))?;
        Ok(Self { inner })
    }

    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_bytes(bytes)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;
        Ok(Self { inner })
    }
}

impl Tokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| anyhow!("Failed to encode text: {}", e))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.inner
            .decode(tokens, false)
            .map_err(|e| anyhow!("Failed to decode tokens: {}", e))
    }
}

/// Cut `text` down to `max_tokens` tokens, noting how much was dropped
pub fn truncate_message(text: &str, tokenizer: &dyn Tokenizer, max_tokens: usize) -> Result<String> {
    let tokens = tokenizer.encode(text)?;
    if tokens.len() <= max_tokens {
        return Ok(text.to_string());
    }
    let left = tokens.len() - max_tokens;
    let decoded = tokenizer.decode(&tokens[..max_tokens])?;
    Ok(format!("{}... [truncated, {} tokens left]", decoded, left))
}
