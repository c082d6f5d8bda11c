/// 根据后缀数组构建 BWT。
/// text 为数值化字母表（0..SIGMA），sa 为后缀数组位置。
pub fn build_bwt(text: &[u8], sa: &[u32]) -> Vec<u8> {
    let n = text.len();
    if n == 0 {
        return Vec::new();
    }
    let mut bwt = Vec::with_capacity(n);
    for &p in sa {
        let i = p as usize;
        let prev = if i == 0 { text[n - 1] } else { text[i - 1] };
        bwt.push(prev);
    }
    bwt
}

/// 构建反向文本：去掉末尾哨兵后整体反转，再补回哨兵。
/// 反向文本与原文本的字符多重集一致，因此 C 表可以共享。
pub fn reverse_text(text: &[u8]) -> Vec<u8> {
    if text.is_empty() {
        return Vec::new();
    }
    let n = text.len();
    let mut rev: Vec<u8> = text[..n - 1].iter().rev().copied().collect();
    rev.push(text[n - 1]);
    rev
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::sa::build_sa;

    #[test]
    fn bwt_banana_style() {
        // ACGT$ -> SA = [4,0,1,2,3], BWT = [T,$,A,C,G]
        let text = [1u8, 2, 3, 4, 0];
        let sa = build_sa(&text);
        let bwt = build_bwt(&text, &sa);
        assert_eq!(bwt, vec![4, 0, 1, 2, 3]);
    }

    #[test]
    fn reverse_text_keeps_sentinel_last() {
        let text = [1u8, 2, 3, 0];
        let rev = reverse_text(&text);
        assert_eq!(rev, vec![3, 2, 1, 0]);
        // 字符多重集一致
        let mut a = text.to_vec();
        let mut b = rev.clone();
        a.sort_unstable();
        b.sort_unstable();
        assert_eq!(a, b);
    }
}
