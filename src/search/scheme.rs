use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;

/// 一次检索的调度描述：部件访问顺序 π 与访问每个前缀后的
/// 累计误差下界 L、上界 U。构造后不可变。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Search {
    pi: Vec<usize>,
    lower: Vec<usize>,
    upper: Vec<usize>,
}

impl Search {
    /// 构造并校验：π 必须是 0..p 的排列且满足连通性（每个新部件
    /// 与已访问的连续块相邻），L/U 单调不减且 L ≤ U。
    pub fn new(pi: Vec<usize>, lower: Vec<usize>, upper: Vec<usize>) -> Result<Self> {
        let p = pi.len();
        if p == 0 || lower.len() != p || upper.len() != p {
            bail!("search arrays must be non-empty and of equal length");
        }
        let mut seen = vec![false; p];
        for &x in &pi {
            if x >= p || seen[x] {
                bail!("pi is not a permutation of 0..{}: {:?}", p, pi);
            }
            seen[x] = true;
        }
        // 连通性：已访问部件构成连续区间，新部件必须与之相邻
        let mut lo = pi[0];
        let mut hi = pi[0];
        for &x in &pi[1..] {
            if x + 1 == lo {
                lo = x;
            } else if x == hi + 1 {
                hi = x;
            } else {
                bail!("search is not connected: {:?}", pi);
            }
        }
        for i in 0..p {
            if lower[i] > upper[i] {
                bail!("lower bound exceeds upper bound at position {}", i);
            }
            if i > 0 && (lower[i] < lower[i - 1] || upper[i] < upper[i - 1]) {
                bail!("bounds must be weakly increasing: L={:?} U={:?}", lower, upper);
            }
        }
        Ok(Self { pi, lower, upper })
    }

    #[inline]
    pub fn num_parts(&self) -> usize {
        self.pi.len()
    }

    #[inline]
    pub fn part(&self, i: usize) -> usize {
        self.pi[i]
    }

    #[inline]
    pub fn lower(&self, i: usize) -> usize {
        self.lower[i]
    }

    #[inline]
    pub fn upper(&self, i: usize) -> usize {
        self.upper[i]
    }

    /// 总误差上限（U 的末项）
    #[inline]
    pub fn max_ed(&self) -> usize {
        *self.upper.last().unwrap()
    }

    /// 该检索是否覆盖给定的误差分布（每个部件的误差数）。
    pub fn covers(&self, errors: &[usize]) -> bool {
        let mut cum = 0usize;
        for i in 0..self.pi.len() {
            cum += errors[self.pi[i]];
            if cum < self.lower[i] || cum > self.upper[i] {
                return false;
            }
        }
        true
    }
}

/// 枚举 p 个部件、总和 ≤ k 的所有误差分布，检查每个分布都被
/// 方案中的某个检索覆盖。未覆盖时报告第一个缺口。
pub fn check_coverage(searches: &[Search], p: usize, k: usize) -> Result<()> {
    let mut errors = vec![0usize; p];
    check_coverage_rec(searches, &mut errors, 0, k)
}

fn check_coverage_rec(
    searches: &[Search],
    errors: &mut Vec<usize>,
    idx: usize,
    budget: usize,
) -> Result<()> {
    if idx == errors.len() {
        if !searches.iter().any(|s| s.covers(errors)) {
            bail!("error pattern {:?} is not covered by any search", errors);
        }
        return Ok(());
    }
    for e in 0..=budget {
        errors[idx] = e;
        check_coverage_rec(searches, errors, idx + 1, budget - e)?;
    }
    errors[idx] = 0;
    Ok(())
}

/// 某个误差上限 k 下的方案：检索列表加上可选的切分参数。
/// 缺省参数由访问器现算（均匀切分、均匀种子、单位权重）。
#[derive(Debug, Clone)]
pub struct SchemeForK {
    pub searches: Vec<Search>,
    pub static_positions: Option<Vec<f64>>,
    pub seeding_positions: Option<Vec<f64>>,
    pub weights: Option<Vec<usize>>,
}

impl SchemeForK {
    fn plain(searches: Vec<Search>) -> Self {
        Self { searches, static_positions: None, seeding_positions: None, weights: None }
    }

    #[inline]
    pub fn num_parts(&self) -> usize {
        self.searches[0].num_parts()
    }

    /// 静态切分的相对起点（第二个到最后一个部件）
    pub fn begins(&self) -> Vec<f64> {
        match &self.static_positions {
            Some(v) => v.clone(),
            None => {
                let p = self.num_parts();
                (1..p).map(|i| i as f64 / p as f64).collect()
            }
        }
    }

    /// 动态切分中间部件的种子位置（首尾部件固定在两端）
    pub fn seeds(&self) -> Vec<f64> {
        match &self.seeding_positions {
            Some(v) => v.clone(),
            None => {
                let p = self.num_parts();
                if p < 3 {
                    return Vec::new();
                }
                let u = 1.0 / (p as f64 - 1.0);
                (1..p - 1).map(|i| i as f64 * u).collect()
            }
        }
    }

    /// 动态切分的部件权重
    pub fn part_weights(&self) -> Vec<usize> {
        match &self.weights {
            Some(v) => v.clone(),
            None => vec![1; self.num_parts()],
        }
    }
}

/// 策略记录：一个方案名，每个 k（1..=4）一份检索列表与切分参数。
/// naive 标志选择无切分的朴素回溯路径。
#[derive(Debug, Clone)]
pub struct Strategy {
    pub name: String,
    pub naive: bool,
    per_k: Vec<Option<SchemeForK>>,
}

pub const MAX_SCHEME_ED: usize = 4;

impl Strategy {
    pub fn supports(&self, k: usize) -> bool {
        k >= 1 && k <= MAX_SCHEME_ED && self.per_k[k - 1].is_some()
    }

    pub fn scheme(&self, k: usize) -> Result<&SchemeForK> {
        if k < 1 || k > MAX_SCHEME_ED {
            bail!("max distance {} is out of range for scheme '{}'", k, self.name);
        }
        self.per_k[k - 1]
            .as_ref()
            .ok_or_else(|| anyhow!("scheme '{}' does not support max distance {}", self.name, k))
    }

    /// 校验每个受支持的 k：部件数一致、U 末项等于 k、覆盖所有误差分布、
    /// 切分参数形状正确。
    pub fn validate(&self) -> Result<()> {
        if self.naive {
            return Ok(());
        }
        let mut any = false;
        for k in 1..=MAX_SCHEME_ED {
            let scheme = match &self.per_k[k - 1] {
                Some(s) => s,
                None => continue,
            };
            any = true;
            if scheme.searches.is_empty() {
                bail!("scheme '{}' has no searches for k={}", self.name, k);
            }
            let p = scheme.num_parts();
            for s in &scheme.searches {
                if s.num_parts() != p {
                    bail!("scheme '{}' k={}: searches disagree on the number of parts", self.name, k);
                }
                if s.max_ed() != k {
                    bail!("scheme '{}' k={}: search upper bound ends at {}", self.name, k, s.max_ed());
                }
            }
            check_coverage(&scheme.searches, p, k)
                .with_context(|| format!("scheme '{}' k={}", self.name, k))?;
            if let Some(b) = &scheme.static_positions {
                validate_fractions(b, p - 1)
                    .with_context(|| format!("scheme '{}' k={}: static partitioning", self.name, k))?;
            }
            if let Some(s) = &scheme.seeding_positions {
                validate_fractions(s, p.saturating_sub(2))
                    .with_context(|| format!("scheme '{}' k={}: dynamic seeding", self.name, k))?;
            }
            if let Some(w) = &scheme.weights {
                if w.len() != p {
                    bail!("scheme '{}' k={}: expected {} weights, got {}", self.name, k, p, w.len());
                }
                if w.iter().any(|&x| x == 0) {
                    bail!("scheme '{}' k={}: weights must be positive", self.name, k);
                }
            }
        }
        if !any {
            bail!("scheme '{}' supports no distance at all", self.name);
        }
        Ok(())
    }

    /// 内置方案目录。
    pub fn builtin(name: &str) -> Result<Strategy> {
        let strategy = match name {
            "kuch1" => kucherov_kplus1()?,
            "kuch2" => kucherov_kplus2()?,
            "kianfar" => optimal_kianfar()?,
            "manbest" => man_best()?,
            "pigeon" => pigeon_hole()?,
            "01*0" => o1star()?,
            "naive" => Strategy {
                name: "naive backtracking".to_string(),
                naive: true,
                per_k: vec![None, None, None, None],
            },
            other => bail!(
                "{} is not an option as search scheme\nOptions are: kuch1, kuch2, kianfar, manbest, pigeon, 01*0, naive, custom",
                other
            ),
        };
        strategy.validate()?;
        Ok(strategy)
    }

    /// 从自定义方案目录读取：name.txt 给出名字，每个受支持的 k 一个
    /// 子目录，内含 searches.txt 与可选的切分参数文件。
    pub fn from_folder(folder: &Path) -> Result<Strategy> {
        let name_file = folder.join("name.txt");
        let name = std::fs::read_to_string(&name_file)
            .with_context(|| format!("cannot read scheme name from '{}'", name_file.display()))?
            .lines()
            .next()
            .unwrap_or("")
            .trim()
            .to_string();
        if name.is_empty() {
            bail!("scheme folder '{}' has an empty name.txt", folder.display());
        }

        let mut per_k: Vec<Option<SchemeForK>> = vec![None, None, None, None];
        for k in 1..=MAX_SCHEME_ED {
            let dir = folder.join(k.to_string());
            if !dir.is_dir() {
                continue;
            }
            let searches_file = dir.join("searches.txt");
            let content = std::fs::read_to_string(&searches_file)
                .with_context(|| format!("cannot read '{}'", searches_file.display()))?;
            let mut searches = Vec::new();
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                searches.push(
                    parse_search(line)
                        .with_context(|| format!("invalid search line '{}'", line))?,
                );
            }
            let mut scheme = SchemeForK::plain(searches);

            let static_file = dir.join("static_partitioning.txt");
            if static_file.is_file() {
                let text = std::fs::read_to_string(&static_file)?;
                let first = text.lines().next().unwrap_or("");
                scheme.static_positions = Some(parse_floats(first)?);
            }
            let dynamic_file = dir.join("dynamic_partitioning.txt");
            if dynamic_file.is_file() {
                let text = std::fs::read_to_string(&dynamic_file)?;
                let mut lines = text.lines();
                let seeds = lines.next().unwrap_or("");
                let weights = lines
                    .next()
                    .ok_or_else(|| anyhow!("'{}' must have a weights line", dynamic_file.display()))?;
                scheme.seeding_positions = Some(parse_floats(seeds)?);
                scheme.weights = Some(parse_ints(weights)?);
            }
            per_k[k - 1] = Some(scheme);
        }

        let strategy = Strategy { name, naive: false, per_k };
        strategy.validate()?;
        Ok(strategy)
    }
}

/// 解析 "{0,1,2} {0,0,0} {0,2,2}" 形式的一行检索。
fn parse_search(line: &str) -> Result<Search> {
    let arrays: Vec<&str> = line.split_whitespace().collect();
    if arrays.len() != 3 {
        bail!("expected three brace-arrays (pi, L, U), got {}", arrays.len());
    }
    Search::new(
        parse_braced(arrays[0])?,
        parse_braced(arrays[1])?,
        parse_braced(arrays[2])?,
    )
}

fn parse_braced(s: &str) -> Result<Vec<usize>> {
    let inner = s
        .strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
        .ok_or_else(|| anyhow!("array '{}' is not brace-enclosed", s))?;
    inner
        .split(',')
        .map(|tok| {
            tok.trim()
                .parse::<usize>()
                .map_err(|_| anyhow!("'{}' is not a number", tok))
        })
        .collect()
}

fn parse_floats(line: &str) -> Result<Vec<f64>> {
    line.split_whitespace()
        .map(|tok| tok.parse::<f64>().map_err(|_| anyhow!("'{}' is not a number", tok)))
        .collect()
}

fn parse_ints(line: &str) -> Result<Vec<usize>> {
    line.split_whitespace()
        .map(|tok| tok.parse::<usize>().map_err(|_| anyhow!("'{}' is not a number", tok)))
        .collect()
}

/// 检查静态/动态切分的相对位置：个数正确、严格递增、落在 (0,1) 开区间。
fn validate_fractions(values: &[f64], expected: usize) -> Result<()> {
    if values.len() != expected {
        bail!("expected {} values, got {}", expected, values.len());
    }
    let mut prev = 0.0;
    for &v in values {
        if v <= prev || v >= 1.0 {
            bail!("positions must be strictly increasing within (0, 1): {:?}", values);
        }
        prev = v;
    }
    Ok(())
}

fn s(pi: &[usize], lo: &[usize], up: &[usize]) -> Result<Search> {
    Search::new(pi.to_vec(), lo.to_vec(), up.to_vec())
}

fn scheme(
    searches: Vec<Search>,
    seeds: &[f64],
    weights: &[usize],
    statics: &[f64],
) -> SchemeForK {
    SchemeForK {
        searches,
        static_positions: Some(statics.to_vec()),
        seeding_positions: Some(seeds.to_vec()),
        weights: Some(weights.to_vec()),
    }
}

fn kucherov_kplus1() -> Result<Strategy> {
    let ed1 = vec![
        s(&[0, 1], &[0, 1], &[0, 1])?,
        s(&[1, 0], &[0, 0], &[0, 1])?,
    ];
    let ed2 = vec![
        s(&[0, 1, 2], &[0, 0, 0], &[0, 2, 2])?,
        s(&[2, 1, 0], &[0, 0, 0], &[0, 1, 2])?,
        s(&[1, 0, 2], &[0, 0, 1], &[0, 1, 2])?,
    ];
    let ed3 = vec![
        s(&[0, 1, 2, 3], &[0, 0, 0, 0], &[0, 1, 3, 3])?,
        s(&[1, 0, 2, 3], &[0, 0, 1, 1], &[0, 1, 3, 3])?,
        s(&[2, 3, 1, 0], &[0, 0, 0, 0], &[0, 1, 3, 3])?,
        s(&[3, 2, 1, 0], &[0, 0, 1, 1], &[0, 1, 3, 3])?,
    ];
    let ed4 = vec![
        s(&[0, 1, 2, 3, 4], &[0, 0, 0, 0, 0], &[0, 2, 2, 4, 4])?,
        s(&[4, 3, 2, 1, 0], &[0, 0, 0, 0, 0], &[0, 1, 3, 4, 4])?,
        s(&[1, 0, 2, 3, 4], &[0, 0, 1, 3, 3], &[0, 1, 3, 3, 4])?,
        s(&[0, 1, 2, 3, 4], &[0, 0, 1, 3, 3], &[0, 1, 3, 3, 4])?,
        s(&[3, 2, 4, 1, 0], &[0, 0, 0, 1, 1], &[0, 1, 2, 4, 4])?,
        s(&[2, 1, 0, 3, 4], &[0, 0, 0, 1, 3], &[0, 1, 2, 4, 4])?,
        s(&[1, 0, 2, 3, 4], &[0, 0, 1, 2, 4], &[0, 1, 2, 4, 4])?,
        s(&[0, 1, 2, 3, 4], &[0, 0, 0, 3, 4], &[0, 0, 4, 4, 4])?,
    ];
    Ok(Strategy {
        name: "KUCHEROV K + 1".to_string(),
        naive: false,
        per_k: vec![
            Some(scheme(ed1, &[], &[1, 1], &[0.5])),
            Some(scheme(ed2, &[0.57], &[39, 10, 40], &[0.41, 0.7])),
            Some(scheme(ed3, &[0.38, 0.65], &[400, 4, 5, 400], &[0.25, 0.50, 0.75])),
            Some(scheme(
                ed4,
                &[0.38, 0.55, 0.73],
                &[100, 5, 1, 6, 105],
                &[0.27, 0.47, 0.62, 0.81],
            )),
        ],
    })
}

fn kucherov_kplus2() -> Result<Strategy> {
    let ed1 = vec![
        s(&[0, 1, 2], &[0, 0, 0], &[0, 1, 1])?,
        s(&[1, 2, 0], &[0, 0, 0], &[0, 0, 1])?,
    ];
    let ed2 = vec![
        s(&[0, 1, 2, 3], &[0, 0, 0, 0], &[0, 1, 1, 2])?,
        s(&[3, 2, 1, 0], &[0, 0, 0, 0], &[0, 1, 2, 2])?,
        s(&[1, 2, 3, 0], &[0, 0, 0, 1], &[0, 0, 1, 2])?,
        s(&[0, 1, 2, 3], &[0, 0, 0, 2], &[0, 0, 2, 2])?,
    ];
    let ed3 = vec![
        s(&[0, 1, 2, 3, 4], &[0, 0, 0, 0, 0], &[0, 1, 2, 3, 3])?,
        s(&[1, 2, 3, 4, 0], &[0, 0, 0, 0, 0], &[0, 1, 2, 2, 3])?,
        s(&[2, 3, 4, 1, 0], &[0, 0, 0, 0, 1], &[0, 1, 1, 3, 3])?,
        s(&[3, 4, 2, 1, 0], &[0, 0, 0, 1, 2], &[0, 0, 3, 3, 3])?,
    ];
    let ed4 = vec![
        s(&[0, 1, 2, 3, 4, 5], &[0, 0, 0, 0, 0, 0], &[0, 1, 2, 3, 4, 4])?,
        s(&[1, 2, 3, 4, 5, 0], &[0, 0, 0, 0, 0, 0], &[0, 1, 2, 3, 4, 4])?,
        s(&[5, 4, 3, 2, 1, 0], &[0, 0, 0, 0, 0, 1], &[0, 1, 2, 2, 4, 4])?,
        s(&[3, 4, 5, 2, 1, 0], &[0, 0, 0, 0, 1, 2], &[0, 1, 1, 3, 4, 4])?,
        s(&[2, 3, 4, 5, 1, 0], &[0, 0, 0, 0, 2, 3], &[0, 1, 1, 2, 4, 4])?,
        s(&[4, 5, 3, 2, 1, 0], &[0, 0, 0, 1, 3, 3], &[0, 0, 3, 3, 4, 4])?,
        s(&[0, 1, 2, 3, 4, 5], &[0, 0, 0, 3, 3, 3], &[0, 0, 3, 3, 4, 4])?,
        s(&[0, 1, 2, 3, 4, 5], &[0, 0, 0, 0, 4, 4], &[0, 0, 2, 4, 4, 4])?,
        s(&[2, 3, 1, 0, 4, 5], &[0, 0, 0, 1, 2, 4], &[0, 0, 2, 2, 4, 4])?,
        s(&[4, 5, 3, 2, 1, 0], &[0, 0, 0, 0, 4, 4], &[0, 0, 1, 4, 4, 4])?,
    ];
    Ok(Strategy {
        name: "KUCHEROV K + 2".to_string(),
        naive: false,
        per_k: vec![
            Some(scheme(ed1, &[0.94], &[11, 10, 1], &[0.47, 0.94])),
            Some(scheme(ed2, &[0.48, 0.55], &[400, 4, 1, 800], &[0.35, 0.50, 0.65])),
            Some(scheme(
                ed3,
                &[0.4, 0.63, 0.9],
                &[6, 3, 2, 1, 1],
                &[0.22, 0.44, 0.66, 0.88],
            )),
            Some(scheme(
                ed4,
                &[0.34, 0.5, 0.65, 0.7],
                &[52, 42, 16, 14, 1, 800],
                &[0.18, 0.37, 0.53, 0.69, 0.83],
            )),
        ],
    })
}

fn optimal_kianfar() -> Result<Strategy> {
    let ed1 = vec![
        s(&[0, 1], &[0, 0], &[0, 1])?,
        s(&[1, 0], &[0, 1], &[0, 1])?,
    ];
    let ed2 = vec![
        s(&[0, 1, 2], &[0, 0, 2], &[0, 1, 2])?,
        s(&[2, 1, 0], &[0, 0, 0], &[0, 2, 2])?,
        s(&[1, 2, 0], &[0, 1, 1], &[0, 1, 2])?,
    ];
    let ed3 = vec![
        s(&[0, 1, 2, 3], &[0, 0, 0, 3], &[0, 2, 3, 3])?,
        s(&[1, 2, 3, 0], &[0, 0, 0, 0], &[1, 2, 3, 3])?,
        s(&[2, 3, 1, 0], &[0, 0, 2, 2], &[0, 0, 3, 3])?,
    ];
    let ed4 = vec![
        s(&[0, 1, 2, 3, 4], &[0, 0, 0, 0, 4], &[0, 3, 3, 4, 4])?,
        s(&[1, 2, 3, 4, 0], &[0, 0, 0, 0, 0], &[2, 2, 3, 3, 4])?,
        s(&[4, 3, 2, 1, 0], &[0, 0, 0, 3, 3], &[0, 0, 4, 4, 4])?,
    ];
    Ok(Strategy {
        name: "OPTIMAL KIANFAR".to_string(),
        naive: false,
        per_k: vec![
            Some(scheme(ed1, &[], &[1, 1], &[0.5])),
            Some(scheme(ed2, &[0.50], &[10, 1, 5], &[0.30, 0.60])),
            Some(scheme(ed3, &[0.34, 0.66], &[1, 1, 1, 1], &[0.17, 0.69, 0.96])),
            Some(scheme(ed4, &[0.42, 0.56, 0.67], &[7, 2, 1, 3, 5], &[0.2, 0.5, 0.6, 0.8])),
        ],
    })
}

fn man_best() -> Result<Strategy> {
    let ed4 = vec![
        s(&[0, 1, 2, 3, 4, 5], &[0, 0, 0, 0, 0, 4], &[0, 3, 3, 3, 4, 4])?,
        s(&[1, 2, 3, 4, 5, 0], &[0, 0, 0, 0, 0, 0], &[0, 2, 2, 3, 3, 4])?,
        s(&[2, 1, 3, 4, 5, 0], &[0, 1, 1, 1, 1, 1], &[0, 2, 2, 3, 3, 4])?,
        s(&[3, 2, 1, 4, 5, 0], &[0, 1, 2, 2, 2, 2], &[0, 1, 2, 3, 3, 4])?,
        s(&[5, 4, 3, 2, 1, 0], &[0, 0, 0, 0, 3, 3], &[0, 0, 4, 4, 4, 4])?,
    ];
    Ok(Strategy {
        name: "MANBEST".to_string(),
        naive: false,
        per_k: vec![
            None,
            None,
            None,
            Some(scheme(
                ed4,
                &[0.35, 0.59, 0.67, 0.9],
                &[89, 15, 90, 1, 48, 84],
                &[0.24, 0.43, 0.62, 0.73, 0.77],
            )),
        ],
    })
}

fn o1star() -> Result<Strategy> {
    let ed1 = vec![
        s(&[0, 1, 2], &[0, 0, 0], &[0, 1, 1])?,
        s(&[1, 2, 0], &[0, 0, 0], &[0, 0, 1])?,
    ];
    let ed2 = vec![
        s(&[0, 1, 2, 3], &[0, 0, 0, 0], &[0, 1, 2, 2])?,
        s(&[1, 2, 3, 0], &[0, 0, 0, 0], &[0, 1, 2, 2])?,
        s(&[2, 3, 1, 0], &[0, 0, 0, 0], &[0, 0, 2, 2])?,
    ];
    let ed3 = vec![
        s(&[0, 1, 2, 3, 4], &[0, 0, 0, 0, 0], &[0, 1, 3, 3, 3])?,
        s(&[1, 2, 3, 4, 0], &[0, 0, 0, 0, 0], &[0, 1, 3, 3, 3])?,
        s(&[2, 3, 4, 1, 0], &[0, 0, 0, 0, 0], &[0, 1, 3, 3, 3])?,
        s(&[3, 4, 2, 1, 0], &[0, 0, 0, 0, 0], &[0, 0, 3, 3, 3])?,
    ];
    let ed4 = vec![
        s(&[0, 1, 2, 3, 4, 5], &[0, 0, 0, 0, 0, 0], &[0, 1, 4, 4, 4, 4])?,
        s(&[1, 2, 3, 4, 5, 0], &[0, 0, 0, 0, 0, 0], &[0, 1, 4, 4, 4, 4])?,
        s(&[2, 3, 4, 5, 1, 0], &[0, 0, 0, 0, 0, 0], &[0, 1, 4, 4, 4, 4])?,
        s(&[3, 4, 5, 2, 1, 0], &[0, 0, 0, 0, 0, 0], &[0, 1, 4, 4, 4, 4])?,
        s(&[4, 5, 3, 2, 1, 0], &[0, 0, 0, 0, 0, 0], &[0, 0, 4, 4, 4, 4])?,
    ];
    Ok(Strategy {
        name: "01*0".to_string(),
        naive: false,
        per_k: vec![
            Some(scheme(ed1, &[0.94], &[11, 10, 1], &[0.50, 0.96])),
            Some(scheme(ed2, &[0.51, 0.93], &[20, 11, 11, 10], &[0.26, 0.64, 0.83])),
            Some(scheme(
                ed3,
                &[0.34, 0.64, 0.88],
                &[3, 2, 2, 1, 1],
                &[0.22, 0.46, 0.67, 0.95],
            )),
            Some(scheme(
                ed4,
                &[0.28, 0.48, 0.63, 0.94],
                &[1, 2, 2, 1, 2, 1],
                &[0.19, 0.37, 0.57, 0.74, 0.96],
            )),
        ],
    })
}

fn pigeon_hole() -> Result<Strategy> {
    let ed1 = vec![
        s(&[0, 1], &[0, 0], &[0, 1])?,
        s(&[1, 0], &[0, 0], &[0, 1])?,
    ];
    let ed2 = vec![
        s(&[0, 1, 2], &[0, 0, 0], &[0, 2, 2])?,
        s(&[1, 2, 0], &[0, 0, 0], &[0, 2, 2])?,
        s(&[2, 1, 0], &[0, 0, 0], &[0, 2, 2])?,
    ];
    let ed3 = vec![
        s(&[0, 1, 2, 3], &[0, 0, 0, 0], &[0, 3, 3, 3])?,
        s(&[1, 0, 2, 3], &[0, 0, 0, 0], &[0, 3, 3, 3])?,
        s(&[2, 3, 1, 0], &[0, 0, 0, 0], &[0, 3, 3, 3])?,
        s(&[3, 2, 1, 0], &[0, 0, 0, 0], &[0, 3, 3, 3])?,
    ];
    let ed4 = vec![
        s(&[0, 1, 2, 3, 4], &[0, 0, 0, 0, 0], &[0, 4, 4, 4, 4])?,
        s(&[1, 2, 3, 4, 0], &[0, 0, 0, 0, 0], &[0, 4, 4, 4, 4])?,
        s(&[2, 3, 4, 1, 0], &[0, 0, 0, 0, 0], &[0, 4, 4, 4, 4])?,
        s(&[3, 4, 2, 1, 0], &[0, 0, 0, 0, 0], &[0, 4, 4, 4, 4])?,
        s(&[4, 3, 2, 1, 0], &[0, 0, 0, 0, 0], &[0, 4, 4, 4, 4])?,
    ];
    Ok(Strategy {
        name: "PIGEON HOLE".to_string(),
        naive: false,
        per_k: vec![
            Some(SchemeForK::plain(ed1)),
            Some(SchemeForK::plain(ed2)),
            Some(SchemeForK::plain(ed3)),
            Some(SchemeForK::plain(ed4)),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_accessors() {
        let s = Search::new(vec![1, 0, 2], vec![0, 0, 1], vec![0, 1, 2]).unwrap();
        assert_eq!(s.num_parts(), 3);
        assert_eq!(s.part(0), 1);
        assert_eq!(s.lower(2), 1);
        assert_eq!(s.upper(1), 1);
        assert_eq!(s.max_ed(), 2);
    }

    #[test]
    fn search_rejects_bad_input() {
        assert!(Search::new(vec![0, 0], vec![0, 0], vec![0, 1]).is_err()); // 非排列
        assert!(Search::new(vec![0, 2, 1], vec![0, 0, 0], vec![0, 1, 1]).is_err()); // 不连通
        assert!(Search::new(vec![0, 1], vec![1, 0], vec![1, 1]).is_err()); // L 递减
        assert!(Search::new(vec![0, 1], vec![0, 2], vec![0, 1]).is_err()); // L > U
    }

    #[test]
    fn covers_cumulative_bounds() {
        let s = Search::new(vec![1, 0], vec![0, 0], vec![0, 1]).unwrap();
        assert!(s.covers(&[0, 0]));
        assert!(s.covers(&[1, 0]));
        assert!(!s.covers(&[0, 1])); // 先访问部件 1，累计 1 超过 U[0]=0
        assert!(!s.covers(&[1, 1]));
    }

    #[test]
    fn builtin_schemes_validate() {
        for name in ["kuch1", "kuch2", "kianfar", "manbest", "pigeon", "01*0", "naive"] {
            let st = Strategy::builtin(name).unwrap_or_else(|e| panic!("{}: {}", name, e));
            if name == "manbest" {
                assert!(st.supports(4));
                assert!(!st.supports(1));
            } else if name == "naive" {
                assert!(st.naive);
            } else {
                for k in 1..=4 {
                    assert!(st.supports(k), "{} should support k={}", name, k);
                }
            }
        }
    }

    #[test]
    fn unknown_scheme_is_config_error() {
        assert!(Strategy::builtin("does-not-exist").is_err());
    }

    #[test]
    fn coverage_detects_gap() {
        // 只有一个前向检索，无法覆盖把误差放在部件 0 的分布
        let lone = vec![Search::new(vec![0, 1], vec![0, 0], vec![0, 1]).unwrap()];
        let err = check_coverage(&lone, 2, 1).unwrap_err();
        assert!(err.to_string().contains("not covered"));
        // 鸽笼方案完整覆盖
        let pigeon = Strategy::builtin("pigeon").unwrap();
        let scheme = pigeon.scheme(2).unwrap();
        check_coverage(&scheme.searches, 3, 2).unwrap();
    }

    #[test]
    fn parse_search_line() {
        let s = parse_search("{2,1,0} {0,0,0} {0,1,2}").unwrap();
        assert_eq!(s.part(0), 2);
        assert_eq!(s.upper(2), 2);
        assert!(parse_search("{0,1} {0,0}").is_err());
        assert!(parse_search("0,1 {0,0} {0,1}").is_err());
    }

    #[test]
    fn custom_scheme_roundtrip() {
        let dir = std::env::temp_dir().join("ssmap_custom_scheme_test");
        let k1 = dir.join("1");
        std::fs::create_dir_all(&k1).unwrap();
        std::fs::write(dir.join("name.txt"), "my scheme\n").unwrap();
        std::fs::write(k1.join("searches.txt"), "{0,1} {0,0} {0,1}\n{1,0} {0,0} {0,1}\n").unwrap();
        std::fs::write(k1.join("static_partitioning.txt"), "0.5\n").unwrap();
        std::fs::write(k1.join("dynamic_partitioning.txt"), "\n1 1\n").unwrap();

        let st = Strategy::from_folder(&dir).unwrap();
        assert_eq!(st.name, "my scheme");
        assert!(st.supports(1));
        assert!(!st.supports(2));
        let scheme = st.scheme(1).unwrap();
        assert_eq!(scheme.num_parts(), 2);
        assert_eq!(scheme.begins(), vec![0.5]);
        assert_eq!(scheme.part_weights(), vec![1, 1]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn custom_scheme_uncovered_is_rejected() {
        let dir = std::env::temp_dir().join("ssmap_custom_scheme_bad_test");
        let k1 = dir.join("1");
        std::fs::create_dir_all(&k1).unwrap();
        std::fs::write(dir.join("name.txt"), "broken\n").unwrap();
        // 只有一个检索，覆盖检查必须失败
        std::fs::write(k1.join("searches.txt"), "{0,1} {0,0} {0,1}\n").unwrap();

        let err = Strategy::from_folder(&dir).unwrap_err();
        assert!(format!("{:#}", err).contains("not covered"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn default_partition_parameters() {
        let pigeon = Strategy::builtin("pigeon").unwrap();
        let scheme = pigeon.scheme(2).unwrap(); // 3 个部件，无自定义参数
        assert_eq!(scheme.begins().len(), 2);
        assert_eq!(scheme.seeds().len(), 1);
        assert_eq!(scheme.part_weights(), vec![1, 1, 1]);
    }
}
