use thiserror::Error;

pub type RenderResult<T> = core::result::Result<T, RenderErr>;

#[derive(Debug, Error)]
pub enum RenderErr {
    #[error("render failure: {0}")]
    Failed(String),
}

/// Rasterization seam: ordered (name, score) columns in, encoded bytes out.
/// The production deployment plugs a real image renderer in here; the crate
/// ships a plain-text board so the pipeline is complete without one.
pub trait BoardRenderer: Send + Sync {
    fn render(&self, left: &[(String, i64)], right: &[(String, i64)]) -> RenderResult<Vec<u8>>;

    fn file_name(&self) -> &'static str;
}

/// Fixed-width two-column text board, ten rows a side.
pub struct TextBoard {
    rows: usize,
}

impl TextBoard {
    pub fn new() -> Self {
        Self { rows: 10 }
    }
}

impl Default for TextBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardRenderer for TextBoard {
    fn render(&self, left: &[(String, i64)], right: &[(String, i64)]) -> RenderResult<Vec<u8>> {
        let mut out = String::new();
        out.push_str(&format!(
            "{:<4}{:<28}{:>8}   {:<28}{:>8}\n",
            "#", "top gifters", "gifts", "top tappers", "likes"
        ));

        for i in 0..self.rows {
            let (lname, lscore) = cell(left, i);
            let (rname, rscore) = cell(right, i);
            out.push_str(&format!(
                "{:<4}{:<28}{:>8}   {:<28}{:>8}\n",
                i + 1,
                lname,
                lscore,
                rname,
                rscore
            ));
        }

        Ok(out.into_bytes())
    }

    fn file_name(&self) -> &'static str {
        "board.txt"
    }
}

fn cell(rows: &[(String, i64)], i: usize) -> (String, String) {
    match rows.get(i) {
        Some((name, score)) => (name.clone(), score.to_string()),
        None => (String::from("-"), String::from("-")),
    }
}
