pub mod blocked_entity;
