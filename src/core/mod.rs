// Domain-layer modules and shared errors/models
pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}

pub mod conversation_store {
    pub use crate::conversation_store::*;
}

pub mod chat_orchestrator {
    pub use crate::chat_orchestrator::*;
}

pub mod lead_analyzer {
    pub use crate::lead_analyzer::*;
}
