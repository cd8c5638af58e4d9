// Concrete implementations of the domain ports that are not tied to a config source.

pub mod repository;
