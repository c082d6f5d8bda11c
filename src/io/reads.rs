use anyhow::{anyhow, bail, Result};
use std::io::BufRead;

/// 一条待比对的 read（FASTA/FASTQ/CSV 统一后的形态）。
#[derive(Debug, Clone)]
pub struct ReadRecord {
    pub id: String,
    pub seq: Vec<u8>,
}

/// 按扩展名分派读入 reads 文件。支持 fa/fasta、fq/fastq 与带表头的
/// csv（read 取第 2 列，标识取第 1 列，列数不足按错误处理）。
pub fn read_reads(path: &str) -> Result<Vec<ReadRecord>> {
    let ext = path.rsplit('.').next().unwrap_or("");
    let fh = std::fs::File::open(path)
        .map_err(|e| anyhow!("cannot open reads file '{}': {}", path, e))?;
    let reader = std::io::BufReader::new(fh);
    match ext {
        "fa" | "fasta" | "FASTA" => read_fasta(reader),
        "fq" | "fastq" => read_fastq(reader),
        "csv" => read_csv(reader),
        other => bail!("extension '{}' is not a valid extension for the reads file", other),
    }
}

/// 读入 FASTA 参考（供索引构建使用），返回 (标识, 序列) 列表。
pub fn read_fasta<R: BufRead>(reader: R) -> Result<Vec<ReadRecord>> {
    let mut records = Vec::new();
    let mut id: Option<String> = None;
    let mut seq: Vec<u8> = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if let Some(header) = line.strip_prefix('>') {
            if let Some(prev) = id.take() {
                records.push(ReadRecord { id: prev, seq: std::mem::take(&mut seq) });
            }
            // 标识取到第一个空白符为止
            id = Some(header.split_whitespace().next().unwrap_or("").to_string());
        } else if id.is_some() {
            for &b in line.as_bytes() {
                if !b.is_ascii_whitespace() {
                    seq.push(b.to_ascii_uppercase());
                }
            }
        }
    }
    if let Some(prev) = id.take() {
        records.push(ReadRecord { id: prev, seq });
    }
    Ok(records)
}

fn read_fastq<R: BufRead>(mut reader: R) -> Result<Vec<ReadRecord>> {
    let mut records = Vec::new();
    let mut buf = String::new();
    loop {
        buf.clear();
        if reader.read_line(&mut buf)? == 0 {
            break;
        }
        if !buf.starts_with('@') {
            bail!("FASTQ header not starting with '@'");
        }
        let id = buf[1..]
            .trim_end()
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_string();

        buf.clear();
        if reader.read_line(&mut buf)? == 0 {
            bail!("unexpected EOF after FASTQ header");
        }
        let seq = buf.trim_end().as_bytes().to_vec();

        buf.clear();
        if reader.read_line(&mut buf)? == 0 || !buf.starts_with('+') {
            bail!("missing '+' line in FASTQ record");
        }
        buf.clear();
        if reader.read_line(&mut buf)? == 0 {
            bail!("missing quality line in FASTQ record");
        }
        if buf.trim_end().len() != seq.len() {
            bail!("FASTQ seq/qual length mismatch for read '{}'", id);
        }
        records.push(ReadRecord { id, seq });
    }
    Ok(records)
}

/// CSV：首行为表头，之后每行至少 3 列，第 1 列是标识、第 2 列是 read。
fn read_csv<R: BufRead>(reader: R) -> Result<Vec<ReadRecord>> {
    let mut records = Vec::new();
    for (no, line) in reader.lines().enumerate() {
        let line = line?;
        if no == 0 || line.trim().is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split(',').collect();
        if cols.len() < 3 {
            bail!("CSV line {} has {} columns, expected at least 3 (id, position, read)", no + 1, cols.len());
        }
        records.push(ReadRecord {
            id: cols[1].trim().to_string(),
            seq: cols[2].trim().as_bytes().to_vec(),
        });
    }
    Ok(records)
}
