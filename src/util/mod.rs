//! DNA 编码 / 反向互补等工具函数

pub mod dna;
