// The cleaning step: state machine over fetch, transform, publish and provenance

pub mod step_driver;
