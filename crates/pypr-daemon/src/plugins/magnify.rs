//! Workspace zoom control.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use pypr_core::Result;
use pypr_core::backend::proxy::BackendProxy;
use pypr_core::config::{ConfigField, ConfigView, FieldType, Schema};
use pypr_types::Environment;
use serde_json::json;

use super::{CommandSpec, Plugin, PluginCtx};

static MAGNIFY_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        ConfigField::new("factor", FieldType::Float)
            .default_value(json!(2.0))
            .describe("Zoom factor used when toggling"),
        ConfigField::new("duration", FieldType::Int)
            .default_value(json!(15))
            .describe("Animation duration in frames (0 disables animation)"),
    ])
});

const COMMANDS: &[CommandSpec] = &[CommandSpec {
    name: "zoom",
    args: "[factor]",
    short: "zooms to \"factor\" or toggles zoom level if factor is omitted",
    detail: "Prefix with + or - for a relative change; a doubled sign\n(e.g. ++0.5) uses exponential steps.",
}];

fn ease_out_quad(step: f64, start: f64, delta: f64, duration: f64) -> f64 {
    let step = step / duration;
    -delta * step * (step - 2.0) + start
}

pub struct MagnifyPlugin {
    name: String,
    backend: BackendProxy,
    config: ConfigView,
    zoomed: bool,
    cur_factor: f64,
}

impl MagnifyPlugin {
    #[must_use]
    pub fn new(ctx: PluginCtx) -> Self {
        Self {
            name: ctx.name,
            backend: ctx.backend,
            config: ConfigView::default(),
            zoomed: false,
            cur_factor: 1.0,
        }
    }

    async fn run_zoom(&mut self, args: &str) -> Result<()> {
        let duration = self.config.get_int("duration", 15);
        let prev_factor = self.cur_factor;
        let mut expo = false;

        let arg = args.split_whitespace().next().unwrap_or("");
        if arg.is_empty() {
            self.cur_factor = if self.zoomed {
                1.0
            } else {
                self.config.get_float("factor", 2.0)
            };
        } else {
            let mut chars = arg.chars();
            let first = chars.next().unwrap_or('0');
            let relative = matches!(first, '+' | '-');
            expo = relative && matches!(chars.next(), Some('+' | '-'));
            let number = if expo { &arg[1..] } else { arg };
            let value: f64 = number.parse().unwrap_or(0.0);
            if relative {
                self.cur_factor += value;
            } else {
                self.cur_factor = value;
            }
        }
        self.cur_factor = self.cur_factor.max(1.0);

        let display = |factor: f64| {
            if expo {
                2f64.powf(factor - 1.0)
            } else {
                factor
            }
        };

        if duration > 0 {
            let start = display(prev_factor) * 10.0;
            let end = display(self.cur_factor) * 10.0;
            for i in 0..duration {
                let step = ease_out_quad(i as f64, start, end - start, duration as f64);
                self.backend
                    .set_keyword(&format!("misc:cursor_zoom_factor {}", step / 10.0))
                    .await?;
                tokio::time::sleep(Duration::from_secs_f64(1.0 / 60.0)).await;
            }
        }

        self.zoomed = (self.cur_factor - 1.0).abs() > f64::EPSILON;
        self.backend
            .set_keyword(&format!("misc:cursor_zoom_factor {}", display(self.cur_factor)))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Plugin for MagnifyPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn environments(&self) -> &'static [Environment] {
        &[Environment::Hyprland]
    }

    fn schema(&self) -> Option<&'static Schema> {
        Some(&MAGNIFY_SCHEMA)
    }

    fn commands(&self) -> &'static [CommandSpec] {
        COMMANDS
    }

    fn load_config(&mut self, view: ConfigView) {
        self.config = view;
    }

    async fn on_command(&mut self, command: &str, args: &str) -> Result<Option<String>> {
        if command == "zoom" {
            self.run_zoom(args).await?;
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ease_out_quad_endpoints() {
        // Starts at `start`, approaches `start + delta` near the end.
        let first = ease_out_quad(0.0, 10.0, 20.0, 15.0);
        assert!((first - 10.0).abs() < f64::EPSILON);
        let last = ease_out_quad(15.0, 10.0, 20.0, 15.0);
        assert!((last - 30.0).abs() < 0.001);
    }

    #[test]
    fn test_ease_out_quad_monotonic() {
        let mut previous = f64::MIN;
        for i in 0..=15 {
            let v = ease_out_quad(f64::from(i), 10.0, 20.0, 15.0);
            assert!(v >= previous);
            previous = v;
        }
    }
}
