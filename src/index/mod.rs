//! 索引构建与双向 FM 索引（后缀数组、BWT、稀疏 SA、Occ 表）

pub mod bwt;
pub mod fm;
pub mod sa;
