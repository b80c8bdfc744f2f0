pub mod derived;
