// Domain layer: tenant-scoped entities, status rules and ports (interfaces).

pub mod model;
pub mod ports;
