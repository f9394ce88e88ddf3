//! Business rules that sit beside the chat service but own no storage.
//!
//! Services here depend on traits (ports), never on concrete
//! infrastructure implementations.

pub mod password;
