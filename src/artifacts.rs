//! Sorting a run's bindings into things a caller can display.

use crate::errors::Result;
use crate::figure::{Figure, FigureRenderer, Image};
use crate::frame::Table;
use crate::protocol::ExecutionResult;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A classified value together with the name it was bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Named<T> {
    pub name: String,
    pub value: T,
}

impl<T> Named<T> {
    fn new(name: &str, value: T) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }
}

/// Renderable output of one run, in binding-name order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    pub tables: Vec<Named<Table>>,
    pub images: Vec<Named<Image>>,
    pub figures: Vec<Named<Figure>>,
    pub texts: Vec<Named<String>>,
}

impl Artifacts {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
            && self.images.is_empty()
            && self.figures.is_empty()
            && self.texts.is_empty()
    }

    /// Render every figure and append the images. Figures are consumed as
    /// they are rendered.
    pub fn render_figures(&mut self, renderer: &dyn FigureRenderer) -> Result<()> {
        for Named { name, value } in std::mem::take(&mut self.figures) {
            let image = renderer.render(value)?;
            debug!(name = %name, format = %image.format, "rendered figure");
            self.images.push(Named { name, value: image });
        }
        Ok(())
    }
}

/// Whether a string binding is meant as a text note.
fn is_text_name(name: &str) -> bool {
    name.to_lowercase().starts_with("text")
}

/// Classify the bindings of `result`. Each binding lands in at most one
/// category; everything else is ignored.
pub fn classify(result: &ExecutionResult) -> Artifacts {
    let mut artifacts = Artifacts::default();
    for (name, value) in &result.bindings {
        match value {
            Value::Table(table) => artifacts.tables.push(Named::new(name, table.clone())),
            Value::Series(series) => artifacts
                .tables
                .push(Named::new(name, series.to_frame(Some(name)))),
            Value::Image(image) => artifacts.images.push(Named::new(name, image.clone())),
            Value::Figure(figure) => artifacts.figures.push(Named::new(name, figure.clone())),
            Value::Str(text) if is_text_name(name) => {
                artifacts.texts.push(Named::new(name, text.clone()))
            }
            _ => {}
        }
    }
    artifacts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::figure::{ImageFormat, PlotKind, SvgRenderer};
    use crate::frame::Series;

    fn result_with(bindings: Vec<(&str, Value)>) -> ExecutionResult {
        ExecutionResult {
            bindings: bindings
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_classify_categories() {
        let table = Table::new(vec![("a".to_string(), vec![Value::Int(1)])]).unwrap();
        let series = Series::new(None, vec![Value::Int(1), Value::Int(2)]);
        let result = result_with(vec![
            ("df", Value::Table(table.clone())),
            ("counts", Value::Series(series)),
            ("Text_summary", Value::Str("hello".into())),
            ("note", Value::Str("ignored".into())),
            ("n", Value::Int(3)),
            ("fig", Value::Figure(Figure::new())),
        ]);
        let artifacts = classify(&result);

        // Name order: counts before df.
        assert_eq!(artifacts.tables.len(), 2);
        assert_eq!(artifacts.tables[0].name, "counts");
        assert_eq!(artifacts.tables[0].value.column_names(), vec!["counts"]);
        assert_eq!(artifacts.tables[1].value, table);
        assert_eq!(artifacts.texts.len(), 1);
        assert_eq!(artifacts.texts[0].value, "hello");
        assert_eq!(artifacts.figures.len(), 1);
        assert!(artifacts.images.is_empty());
    }

    #[test]
    fn test_classify_does_not_mutate() {
        let result = result_with(vec![("text", Value::Str("a".into()))]);
        let before = result.clone();
        let _ = classify(&result);
        assert_eq!(result, before);
    }

    #[test]
    fn test_empty_result() {
        assert!(classify(&ExecutionResult::default()).is_empty());
    }

    #[test]
    fn test_render_figures_moves_to_images() {
        let mut fig = Figure::new();
        fig.add_plot(
            PlotKind::Line,
            vec![Value::Int(1), Value::Int(2)],
            vec![Value::Int(3), Value::Int(4)],
            None,
        )
        .unwrap();
        let result = result_with(vec![("chart", Value::Figure(fig))]);
        let mut artifacts = classify(&result);
        artifacts.render_figures(&SvgRenderer::default()).unwrap();

        assert!(artifacts.figures.is_empty());
        assert_eq!(artifacts.images.len(), 1);
        assert_eq!(artifacts.images[0].name, "chart");
        assert_eq!(artifacts.images[0].value.format, ImageFormat::Svg);
        assert!(artifacts.images[0].value.data.starts_with(b"<svg"));
    }
}
