pub mod negotiator;
pub mod phase_aligner;
pub mod preprocess;
pub mod remixer;
