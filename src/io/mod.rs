//! reads 文件解析（FASTA / FASTQ / CSV）

pub mod reads;
