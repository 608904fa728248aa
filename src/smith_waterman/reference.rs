use crate::substitution::SubstitutionTable;

/// Full-matrix Smith Waterman with a linear gap penalty. Quadratic memory; only used to check
/// the lane kernel. Returns the best score and the 1-based target offset where it is first
/// reached (0 when nothing scores).
pub fn smith_waterman(
    query: &[u8],
    target: &[u8],
    table: &SubstitutionTable,
    gap: i16,
) -> (i32, u32) {
    let gap = gap as i32;
    let mut score_matrix = vec![vec![0i32; query.len() + 1]; target.len() + 1];
    let mut best = (0, 0);

    for j in 1..=target.len() {
        for i in 1..=query.len() {
            let diag = score_matrix[j - 1][i - 1] + table.score(target[j - 1], query[i - 1]) as i32;
            let up = score_matrix[j][i - 1] - gap;
            let left = score_matrix[j - 1][i] - gap;
            let score = diag.max(up).max(left).max(0);
            score_matrix[j][i] = score;

            if score > best.0 {
                best = (score, j as u32);
            }
        }
    }

    best
}
