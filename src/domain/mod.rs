// Domain layer: records, rules, reports and the ports the engine talks through.

pub mod model;
pub mod ports;
