pub mod chain_helpers;

pub use chain_helpers::{
    calculate_quantums, calculate_subticks, good_til_block_time_after, usdc_to_quantums,
};
