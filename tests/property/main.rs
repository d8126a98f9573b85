// tests/property/main.rs

mod rules;
