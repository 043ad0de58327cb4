pub mod claim_path;
pub mod credential;
pub mod input_descriptor;
pub mod presentation_definition;
pub mod presentation_submission;
pub mod selection;
