pub mod helpers;
mod integration;
