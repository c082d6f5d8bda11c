use crate::index::fm::{Range, SARangePair};

/// 索引内命中：区间对、文本块长度（深度）与检索得到的距离。
#[derive(Debug, Clone)]
pub struct FMOcc {
    pub pair: SARangePair,
    pub length: usize,
    pub distance: usize,
}

/// 文本坐标下的最终命中。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextOcc {
    pub range: Range,
    pub distance: usize,
    pub cigar: String,
    /// 来自文本内校验（仅作统计区分）
    pub from_text: bool,
}

impl TextOcc {
    pub fn new(begin: usize, end: usize, distance: usize, cigar: String, from_text: bool) -> Self {
        Self { range: Range::new(begin, end), distance, cigar, from_text }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.range.width()
    }
}

/// 一次 match_approx 的两路命中缓冲。
#[derive(Debug, Default)]
pub struct Occurrences {
    pub in_index: Vec<FMOcc>,
    pub in_text: Vec<TextOcc>,
}

impl Occurrences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_index(&mut self, occ: FMOcc) {
        self.in_index.push(occ);
    }

    pub fn add_text(&mut self, occ: TextOcc) {
        self.in_text.push(occ);
    }

    /// 索引内命中按（区间，深度）去重，同键保留最小距离。
    pub fn dedup_index(&mut self) {
        self.in_index.sort_by(|a, b| {
            (a.pair.fwd.begin, a.pair.fwd.end, a.length, a.distance).cmp(&(
                b.pair.fwd.begin,
                b.pair.fwd.end,
                b.length,
                b.distance,
            ))
        });
        self.in_index.dedup_by(|next, kept| {
            next.pair.fwd == kept.pair.fwd && next.length == kept.length
        });
    }
}

/// 两路合并后的最终去重：按（起点，距离，终点）排序，相同（起点，
/// 终点）的窗口只留距离最小的（排序保证它最先出现），终点不同的
/// 命中是不同的窗口、都要保留。结果按（起点，距离）有序。
pub fn finalize(mut all: Vec<TextOcc>) -> Vec<TextOcc> {
    all.sort_by(|a, b| {
        (a.range.begin, a.distance, a.range.end, a.from_text).cmp(&(
            b.range.begin,
            b.distance,
            b.range.end,
            b.from_text,
        ))
    });
    let mut kept: Vec<TextOcc> = Vec::with_capacity(all.len());
    for occ in all {
        let duplicate = kept
            .iter()
            .rev()
            .take_while(|k| k.range.begin == occ.range.begin)
            .any(|k| k.range.end == occ.range.end);
        if !duplicate {
            kept.push(occ);
        }
    }
    kept
}
