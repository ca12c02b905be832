//! 디스크립터 최근접 이웃 매칭 (L2).
//!
//! 학습 디스크립터 집합마다 kd-트리(`DescriptorIndex`)를 한 번 만들어 두고 질의한다.
//! 전수 탐색 함수(`match_nearest`, `knn_match2`)는 트리가 없는 차원과 검증용으로 남긴다.

use std::fmt;
use std::sync::Arc;

use kiddo::{KdTree, SquaredEuclidean};

use navi_core::models::features::DescriptorMatrix;

/// 쿼리 디스크립터 ↔ 학습 디스크립터 대응
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DMatch {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

fn l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// 쿼리마다 가장 가까운 학습 디스크립터 한 개
pub fn match_nearest(query: &DescriptorMatrix, train: &DescriptorMatrix) -> Vec<DMatch> {
    if train.is_empty() || query.cols() != train.cols() {
        return Vec::new();
    }
    query
        .iter_rows()
        .enumerate()
        .filter_map(|(qi, q)| {
            train
                .iter_rows()
                .enumerate()
                .map(|(ti, t)| DMatch {
                    query_idx: qi,
                    train_idx: ti,
                    distance: l2(q, t),
                })
                .min_by(|a, b| a.distance.total_cmp(&b.distance))
        })
        .collect()
}

/// 쿼리마다 가장 가까운 두 개 (두 번째는 학습 집합이 1개면 None)
pub fn knn_match2(
    query: &DescriptorMatrix,
    train: &DescriptorMatrix,
) -> Vec<(DMatch, Option<DMatch>)> {
    if train.is_empty() || query.cols() != train.cols() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(query.rows());
    for (qi, q) in query.iter_rows().enumerate() {
        let mut best: Option<DMatch> = None;
        let mut second: Option<DMatch> = None;
        for (ti, t) in train.iter_rows().enumerate() {
            let m = DMatch {
                query_idx: qi,
                train_idx: ti,
                distance: l2(q, t),
            };
            match best {
                Some(b) if m.distance >= b.distance => {
                    if second.map_or(true, |s| m.distance < s.distance) {
                        second = Some(m);
                    }
                }
                _ => {
                    second = best;
                    best = Some(m);
                }
            }
        }
        if let Some(b) = best {
            out.push((b, second));
        }
    }
    out
}

/// 같은 축 값이 버킷 크기보다 많으면 kd-트리 분할이 불가능하므로 행마다 더하는 미세 오프셋
const TIE_BREAK: f32 = 1e-9;

enum Tree {
    D64(KdTree<f32, 64>),
    D128(KdTree<f32, 128>),
    /// 트리를 지원하지 않는 차원: 전수 탐색
    Linear,
}

fn build_tree<const K: usize>(train: &DescriptorMatrix) -> KdTree<f32, K> {
    let mut tree: KdTree<f32, K> = KdTree::with_capacity(train.rows().max(1));
    for (i, row) in train.iter_rows().enumerate() {
        let mut p = [0f32; K];
        p.copy_from_slice(row);
        let offset = i as f32 * TIE_BREAK;
        p.iter_mut().for_each(|v| *v += offset);
        tree.add(&p, i as u64);
    }
    tree
}

fn to_point<const K: usize>(row: &[f32]) -> [f32; K] {
    let mut p = [0f32; K];
    p.copy_from_slice(row);
    p
}

/// 학습 디스크립터 집합의 최근접 이웃 인덱스.
///
/// 질의 결과의 거리는 원본 행으로 다시 계산하므로 전수 탐색과 같은 값을 돌려준다.
#[derive(Clone)]
pub struct DescriptorIndex {
    tree: Arc<Tree>,
    rows: usize,
    cols: usize,
}

impl fmt::Debug for DescriptorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match *self.tree {
            Tree::D64(_) | Tree::D128(_) => "kd-tree",
            Tree::Linear => "linear",
        };
        f.debug_struct("DescriptorIndex")
            .field("kind", &kind)
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish()
    }
}

impl DescriptorIndex {
    pub fn build(train: &DescriptorMatrix) -> Self {
        let tree = if train.is_empty() {
            Tree::Linear
        } else {
            match train.cols() {
                64 => Tree::D64(build_tree::<64>(train)),
                128 => Tree::D128(build_tree::<128>(train)),
                _ => Tree::Linear,
            }
        };
        Self {
            tree: Arc::new(tree),
            rows: train.rows(),
            cols: train.cols(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// kd-트리로 질의하는지 (아니면 전수 탐색)
    pub fn is_tree(&self) -> bool {
        !matches!(*self.tree, Tree::Linear)
    }

    /// 질의 행 하나의 최근접 후보 (train 행 번호), 최대 `n`개
    fn candidates(&self, q: &[f32], n: usize) -> Vec<usize> {
        match &*self.tree {
            Tree::D64(tree) => tree
                .nearest_n::<SquaredEuclidean>(&to_point::<64>(q), n)
                .into_iter()
                .map(|nn| nn.item as usize)
                .collect(),
            Tree::D128(tree) => tree
                .nearest_n::<SquaredEuclidean>(&to_point::<128>(q), n)
                .into_iter()
                .map(|nn| nn.item as usize)
                .collect(),
            Tree::Linear => Vec::new(),
        }
    }

    fn usable(&self, query: &DescriptorMatrix, train: &DescriptorMatrix) -> bool {
        !train.is_empty()
            && train.rows() == self.rows
            && train.cols() == self.cols
            && query.cols() == train.cols()
    }

    /// 쿼리마다 가장 가까운 학습 디스크립터 한 개. `train`은 인덱스를 만든 행렬이어야 한다
    pub fn match_nearest(&self, query: &DescriptorMatrix, train: &DescriptorMatrix) -> Vec<DMatch> {
        if !self.usable(query, train) {
            return Vec::new();
        }
        if !self.is_tree() {
            return match_nearest(query, train);
        }
        query
            .iter_rows()
            .enumerate()
            .filter_map(|(qi, q)| {
                self.candidates(q, 1).first().map(|&ti| DMatch {
                    query_idx: qi,
                    train_idx: ti,
                    distance: l2(q, train.row(ti)),
                })
            })
            .collect()
    }

    /// 쿼리마다 가장 가까운 두 개 (거리 오름차순)
    pub fn knn_match2(
        &self,
        query: &DescriptorMatrix,
        train: &DescriptorMatrix,
    ) -> Vec<(DMatch, Option<DMatch>)> {
        if !self.usable(query, train) {
            return Vec::new();
        }
        if !self.is_tree() {
            return knn_match2(query, train);
        }
        let mut out = Vec::with_capacity(query.rows());
        for (qi, q) in query.iter_rows().enumerate() {
            let mut found: Vec<DMatch> = self
                .candidates(q, 2)
                .into_iter()
                .map(|ti| DMatch {
                    query_idx: qi,
                    train_idx: ti,
                    distance: l2(q, train.row(ti)),
                })
                .collect();
            found.sort_by(|a, b| a.distance.total_cmp(&b.distance));
            let mut found = found.into_iter();
            if let Some(best) = found.next() {
                out.push((best, found.next()));
            }
        }
        out
    }
}

/// 최소 거리 기반 적응형 필터: `distance < max(2 × min, floor)`.
///
/// 모든 매칭이 이미 매우 좋을 때 임계값이 0으로 무너지지 않도록 하한을 둔다.
pub fn filter_by_min_distance(matches: &[DMatch], floor: f32) -> Vec<DMatch> {
    let Some(min) = matches.iter().map(|m| m.distance).min_by(f32::total_cmp) else {
        return Vec::new();
    };
    let threshold = (2.0 * min).max(floor);
    matches
        .iter()
        .copied()
        .filter(|m| m.distance < threshold)
        .collect()
}

/// 비율 테스트: 최근접 < ratio × 차근접
pub fn ratio_test(pairs: &[(DMatch, Option<DMatch>)], ratio: f32) -> Vec<DMatch> {
    pairs
        .iter()
        .filter_map(|(best, second)| match second {
            Some(s) if best.distance < ratio * s.distance => Some(*best),
            _ => None,
        })
        .collect()
}

/// 같은 학습 디스크립터에 여러 쿼리가 몰린 경우 가장 가까운 것만 남긴다
pub fn unique_train(matches: &[DMatch]) -> Vec<DMatch> {
    let mut sorted = matches.to_vec();
    sorted.sort_by(|a, b| {
        a.train_idx
            .cmp(&b.train_idx)
            .then(a.distance.total_cmp(&b.distance))
    });
    sorted.dedup_by_key(|m| m.train_idx);
    sorted.sort_by_key(|m| m.query_idx);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: &[[f32; 2]]) -> DescriptorMatrix {
        let data = rows.iter().flat_map(|r| r.iter().copied()).collect();
        DescriptorMatrix::from_raw(rows.len(), 2, data).unwrap()
    }

    #[test]
    fn nearest_picks_closest_row() {
        let train = matrix(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        let query = matrix(&[[0.9, 0.1], [0.1, 0.8]]);
        let m = match_nearest(&query, &train);
        assert_eq!(m.len(), 2);
        assert_eq!(m[0].train_idx, 1);
        assert_eq!(m[1].train_idx, 2);
    }

    #[test]
    fn knn_returns_two_sorted() {
        let train = matrix(&[[0.0, 0.0], [1.0, 0.0], [3.0, 0.0]]);
        let query = matrix(&[[0.8, 0.0]]);
        let pairs = knn_match2(&query, &train);
        let (best, second) = pairs[0];
        assert_eq!(best.train_idx, 1);
        assert_eq!(second.unwrap().train_idx, 0);
    }

    #[test]
    fn distance_filter_uses_floor() {
        let m = |d| DMatch {
            query_idx: 0,
            train_idx: 0,
            distance: d,
        };
        // min = 0 → 임계값은 하한 0.02
        let kept = filter_by_min_distance(&[m(0.0), m(0.01), m(0.03)], 0.02);
        assert_eq!(kept.len(), 2);
        // min = 0.1 → 임계값 0.2
        let kept = filter_by_min_distance(&[m(0.1), m(0.19), m(0.2)], 0.02);
        assert_eq!(kept.len(), 2);
        assert!(filter_by_min_distance(&[], 0.02).is_empty());
    }

    #[test]
    fn ratio_test_rejects_ambiguous() {
        let m = |t, d| DMatch {
            query_idx: 0,
            train_idx: t,
            distance: d,
        };
        let pairs = vec![
            (m(0, 0.1), Some(m(1, 0.5))),
            (m(2, 0.4), Some(m(3, 0.45))),
            (m(4, 0.1), None),
        ];
        let kept = ratio_test(&pairs, 0.75);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].train_idx, 0);
    }

    /// 의사 난수 디스크립터 (히스토그램처럼 0이 많이 섞인 양수 값)
    fn sparse_rows(rows: usize, cols: usize, seed: u32) -> DescriptorMatrix {
        let mut state = seed.wrapping_mul(2_654_435_761).max(1);
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state
        };
        let data = (0..rows * cols)
            .map(|_| {
                let v = next();
                if v % 3 == 0 {
                    0.0
                } else {
                    (v % 1000) as f32 / 1000.0
                }
            })
            .collect();
        DescriptorMatrix::from_raw(rows, cols, data).unwrap()
    }

    #[test]
    fn tree_index_agrees_with_linear_scan() {
        for cols in [64, 128] {
            let train = sparse_rows(600, cols, 7);
            let query = sparse_rows(40, cols, 99);
            let index = DescriptorIndex::build(&train);
            assert!(index.is_tree());
            assert_eq!(index.len(), 600);

            let exact = match_nearest(&query, &train);
            let fast = index.match_nearest(&query, &train);
            assert_eq!(fast.len(), exact.len());
            for (f, e) in fast.iter().zip(&exact) {
                assert_eq!(f.query_idx, e.query_idx);
                assert!((f.distance - e.distance).abs() < 1e-4);
            }

            let exact2 = knn_match2(&query, &train);
            let fast2 = index.knn_match2(&query, &train);
            for ((fb, fs), (eb, es)) in fast2.iter().zip(&exact2) {
                assert!((fb.distance - eb.distance).abs() < 1e-4);
                assert!((fs.unwrap().distance - es.unwrap().distance).abs() < 1e-4);
                assert!(fb.distance <= fs.unwrap().distance);
            }
        }
    }

    #[test]
    fn tree_index_tolerates_repeated_axis_values() {
        // 모든 행이 대부분의 축에서 0: 분할 축 값이 겹쳐도 구성/질의 가능
        let mut data = vec![0.0f32; 500 * 128];
        for i in 0..500 {
            data[i * 128 + (i % 4)] = 1.0 + (i / 4) as f32 * 0.01;
        }
        let train = DescriptorMatrix::from_raw(500, 128, data).unwrap();
        let index = DescriptorIndex::build(&train);
        let query = DescriptorMatrix::from_raw(1, 128, train.row(42).to_vec()).unwrap();
        let m = index.match_nearest(&query, &train);
        assert_eq!(m[0].train_idx, 42);
        assert!(m[0].distance < 1e-6);
    }

    #[test]
    fn index_falls_back_to_linear_for_other_dims() {
        let train = matrix(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        let query = matrix(&[[0.9, 0.1]]);
        let index = DescriptorIndex::build(&train);
        assert!(!index.is_tree());
        assert_eq!(index.match_nearest(&query, &train)[0].train_idx, 1);
        let (best, second) = index.knn_match2(&query, &train)[0];
        assert_eq!(best.train_idx, 1);
        assert!(second.is_some());

        // 다른 행렬로 질의하면 빈 결과
        let other = matrix(&[[0.0, 0.0]]);
        assert!(index.match_nearest(&query, &other).is_empty());
        assert!(DescriptorIndex::build(&DescriptorMatrix::new(128)).is_empty());
    }

    #[test]
    fn unique_train_keeps_best() {
        let matches = vec![
            DMatch { query_idx: 0, train_idx: 5, distance: 0.3 },
            DMatch { query_idx: 1, train_idx: 5, distance: 0.1 },
            DMatch { query_idx: 2, train_idx: 7, distance: 0.2 },
        ];
        let unique = unique_train(&matches);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].query_idx, 1);
        assert_eq!(unique[1].query_idx, 2);
    }
}
