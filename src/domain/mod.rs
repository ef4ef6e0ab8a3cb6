// Domain layer: model types, ports and the pure distribution services.
// Nothing here touches the filesystem.

pub mod model;
pub mod ports;

pub mod services;
