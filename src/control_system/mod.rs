pub mod operator;
pub mod traffic_light_controller;
