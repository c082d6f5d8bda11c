//! 演示如何在 library 模式下使用 ssmap-rust 做近似匹配。
//!
//! 运行方式：
//! ```bash
//! cargo run --example simple_match
//! ```

use ssmap_rust::index::fm::FMIndex;
use ssmap_rust::search::{Counters, DistanceMetric, MatchOpt, Matcher, PartitionPolicy, Strategy};
use ssmap_rust::util::dna;

fn main() {
    // 1. 构建参考文本与双向 FM 索引
    let reference = b"ACGTACGTAGCTGATCGTAGCTAGCTAGCTGATCGTAGCTAGCTAGCTGAT";
    println!("参考序列: {}", std::str::from_utf8(reference).unwrap());
    println!("参考长度: {} bp", reference.len());

    let mut text = dna::encode_reference(reference).expect("参考只含 ACGT");
    text.push(0); // sentinel
    let fm = FMIndex::build(text, 2, 64);
    println!("索引构建完成：文本长度={}（含哨兵）", fm.text_len());

    // 2. 精确匹配
    let pattern = b"GCTGATCGTAG";
    let positions = fm.exact_matches(&dna::encode_pattern(pattern));
    println!("\n精确匹配 '{}': 找到 {} 处 {:?}",
        std::str::from_utf8(pattern).unwrap(), positions.len(), positions);

    // 3. 近似匹配：带一个替换的 read，k=1，kuch1 方案
    let read = b"GCTGATCGTCG";
    let strategy = Strategy::builtin("kuch1").unwrap();
    let opt = MatchOpt {
        max_ed: 1,
        partition: PartitionPolicy::Dynamic,
        metric: DistanceMetric::EditOpt,
        switch_point: 5,
    };
    let matcher = Matcher::new(&fm, &strategy, opt).unwrap();
    let mut counters = Counters::default();
    let occs = matcher.match_approx(read, &mut counters);

    println!("\n近似匹配 '{}'（k=1）：{} 处命中", std::str::from_utf8(read).unwrap(), occs.len());
    for occ in &occs {
        println!("  文本[{}..{}] ED={} CIGAR={}",
            occ.range.begin, occ.range.end, occ.distance, occ.cigar);
    }

    // 4. 反向互补
    let rc = dna::revcomp(read);
    let rc_occs = matcher.match_approx(&rc, &mut counters);
    println!("反向互补命中: {} 处", rc_occs.len());

    println!("\n访问索引结点数: {}", counters.nodes);
    println!("完成！");
}
