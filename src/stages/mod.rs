pub mod stage0_segment;
pub mod stage1_plan;
pub mod stage2_rewrite;
pub mod stage3_assemble;
pub mod stage4_summarize;

pub use stage0_segment::*;
pub use stage1_plan::*;
pub use stage2_rewrite::*;
pub use stage3_assemble::*;
pub use stage4_summarize::*;
