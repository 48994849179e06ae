//! Clients for the native Gemini `generateContent` REST endpoint and for
//! OpenAI-compatible chat relays, plus the invocation cascade that retries
//! content-safety rejections on degraded strategies.
//!
//! - [`parts`]: request content parts (text and inline images).
//! - [`api`]: [`GeminiApi`](api::GeminiApi), the HTTP client.
//! - [`response`]: JSON extraction from free-form model text.
//! - [`cascade`]: the ordered fallback plan and its driver loop.
//! - [`chat`]: OpenAI-compatible chat client for non-Google text models.

pub mod api;
pub mod cascade;
pub mod chat;
pub mod parts;
pub mod response;
