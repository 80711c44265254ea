use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Offset pagination cursor, handed to callers as an opaque token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    pub offset: u64,
    pub limit: u64,
}

impl PageCursor {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    pub fn encode(&self) -> String {
        // serializing two integers cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| Error::InvalidToken)?;
        let cursor: PageCursor = serde_json::from_slice(&bytes).map_err(|_| Error::InvalidToken)?;
        if cursor.limit == 0 {
            return Err(Error::InvalidToken);
        }
        Ok(cursor)
    }

    /// Cursor for the page after this one, if `fetched` filled the page.
    pub fn following(&self, fetched: usize) -> Option<PageCursor> {
        if (fetched as u64) < self.limit {
            return None;
        }
        Some(PageCursor {
            offset: self.offset.checked_add(self.limit)?,
            limit: self.limit,
        })
    }
}
