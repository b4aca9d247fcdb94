pub mod gateway_trust;
