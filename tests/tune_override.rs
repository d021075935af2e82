//! Runs in its own test binary so the environment override is set before
//! anything in the process triggers tuning.

use embedx_db::tune::{process_tuner, TuneSource};
use embedx_db::{simd, tuned_block_size, KernelConfig};

#[test]
fn test_block_size_override_binds_everywhere() {
    std::env::set_var("EMBEDX_BLOCK_SIZE", "32");

    assert_eq!(tuned_block_size(), 32);
    assert_eq!(process_tuner().outcome().source, TuneSource::Override);
    assert_eq!(simd::kernel().block_size(), 32);
    assert_eq!(KernelConfig::tuned().block_size, 32);

    // Cached: later changes to the environment are not observed
    std::env::set_var("EMBEDX_BLOCK_SIZE", "128");
    assert_eq!(tuned_block_size(), 32);
}
