//! Integration tests for the MQTT-SN client against a scripted in-process
//! gateway.

mod client;
mod mock;
