/// One entry of the active-plugin stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginFrame {
    pub app_prefix: String,
    pub plugin: Option<String>,
}

impl PluginFrame {
    pub fn plugin(app_prefix: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self {
            app_prefix: app_prefix.into(),
            plugin: Some(plugin.into()),
        }
    }

    pub fn app(app_prefix: impl Into<String>) -> Self {
        Self {
            app_prefix: app_prefix.into(),
            plugin: None,
        }
    }

    /// Locale domain of the frame: `<prefix>_<plugin>` or `<prefix>`.
    pub fn locale_domain(&self) -> String {
        match &self.plugin {
            Some(plugin) => format!("{}_{}", self.app_prefix, plugin),
            None => self.app_prefix.clone(),
        }
    }
}

/// Which plugin is executing, for locale-domain resolution.
#[derive(Debug, Clone, Default)]
pub struct ActivePluginStack {
    frames: Vec<PluginFrame>,
}

impl ActivePluginStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a frame and return the new depth.
    pub fn push(&mut self, frame: PluginFrame) -> usize {
        self.frames.push(frame);
        self.frames.len()
    }

    pub fn pop(&mut self) -> Option<PluginFrame> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&PluginFrame> {
        self.frames.last()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drop every frame above `depth`.
    pub fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }
}
