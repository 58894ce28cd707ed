pub mod helpers;
mod pipeline;
