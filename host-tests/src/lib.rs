//! Host-based tests for the cellular fetcher
//! These tests run on the development machine, not on the ESP32
