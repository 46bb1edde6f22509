//! Transparent interception proxy between an editor and a language server.
//!
//! Architecture:
//! ```text
//! Editor ←stdio→ [Session] ←pipes→ language server (child)
//!                    │
//!                    ├─► observer socket   (symbol / completion pushes)
//!                    └─◄ inject socket     (ad-hoc one-shot requests)
//! ```

mod classify;
mod endpoint;
mod listener;
mod observer;
mod proxy;
mod session;

pub use endpoint::SessionIo;
pub use proxy::run;
pub use session::run_session;
