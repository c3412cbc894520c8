// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Raw PTY stream chunks associated with a conversation.

use crate::conversation::ConversationId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Identifier of a stream chunk row in the store.
    pub struct ChunkId;
}

/// A raw PTY byte window. Concatenating a conversation's chunks in timestamp
/// order reproduces the verbatim process output up to the retention window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub id: ChunkId,
    pub conversation_id: ConversationId,
    /// Raw bytes as (lossy) UTF-8 text
    pub chunk: String,
    /// Structured payload when the parser recognized the chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed: Option<serde_json::Value>,
    pub timestamp: String,
}
