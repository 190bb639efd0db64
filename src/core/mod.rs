pub mod claim_path;
pub mod constraint;
pub mod identifier;
pub mod registry;
pub mod scope_request;
pub mod validation;
