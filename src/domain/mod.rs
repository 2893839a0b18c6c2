// Domain layer: manifests, runtime models and ports. No runtime logic here.

pub mod languages;
pub mod model;
pub mod ports;
pub mod spec;
