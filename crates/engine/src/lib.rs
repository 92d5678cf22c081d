pub mod cooldown;
pub mod gate;
pub mod hysteresis;
pub mod monitor;
pub mod risk;
