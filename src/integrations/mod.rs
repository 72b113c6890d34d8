// External service clients
pub mod semantic_client {
    pub use crate::semantic_client::*;
}

pub mod llm_client {
    pub use crate::llm_client::*;
}
