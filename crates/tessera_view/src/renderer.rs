//! # View Renderer
//!
//! Drives template execution and builds the render tree.
//!
//! ```text
//! RenderRequest ──normalize──▶ NormalizedRequest
//!                                   │
//!          ┌────────────────────────┼────────────────────────┐
//!          ▼                        ▼                        ▼
//!   text / inline            template / object           collection
//!   (content cache)     (finder + template/file cache)  (node per element)
//!          └────────────┬───────────┘
//!                       ▼
//!              CompiledTemplate::execute(RenderPass)
//!                       │
//!   field reads ──▶ [policy guard] ──▶ [open node's DependencySet] ──▶ record
//! ```
//!
//! A pass is single-threaded: nodes open and close in strict nesting
//! order. Independent passes share only the [`ViewContext`], whose caches
//! are lock-protected.
//!
//! With [`LiveSubscriptions`] a node subscribes to a record the moment it
//! first reads it, so a save landing mid-pass is not missed.

use crate::cache::{template_key, RenderCaches};
use crate::error::{ViewError, ViewResult};
use crate::finder::{dir_of, FoundTemplate, TemplateSource, ViewFinder};
use crate::request::{Bindings, NormalizedRequest, RenderRequest, RenderTarget};
use crate::template::{TemplateEngine, TemplateRef};
use crate::tree::{ConstNode, NodeKind, RenderNode, RenderTree, TreeBuilder};
use std::sync::Arc;
use tessera_core::deps::Query;
use tessera_core::{
    read_through, write_through, FieldInterceptor, IdAllocator, LiveSubscriptions, NodeId, QueryExecutor,
    QueryTarget, RecordError, RecordRef, Schema, Topic, Value,
};

/// Renderer settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RendererConfig {
    /// View used when neither the request nor the enclosing template names one.
    pub default_view: String,
    /// Directories searched for templates, relative to `root`.
    pub view_paths: Vec<String>,
    /// Application root.
    pub root: String,
    /// Escape leaf output for HTML.
    pub escape_html: bool,
    /// Bypass the content cache.
    pub no_content_cache: bool,
    /// Bypass the file cache.
    pub no_file_cache: bool,
    /// Bypass the template cache.
    pub no_template_cache: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            default_view: tessera_shared::DEFAULT_VIEW.to_owned(),
            view_paths: vec!["app/views".to_owned()],
            root: ".".to_owned(),
            escape_html: true,
            no_content_cache: false,
            no_file_cache: false,
            no_template_cache: false,
        }
    }
}

/// Everything render passes share: settings, metamodel, compilers,
/// finder and caches.
pub struct ViewContext {
    config: RendererConfig,
    schema: Arc<Schema>,
    engine: TemplateEngine,
    finder: ViewFinder,
    caches: RenderCaches,
    ids: Arc<IdAllocator>,
    executor: Option<Arc<dyn QueryExecutor>>,
}

impl ViewContext {
    /// Creates a context searching `source` for templates.
    #[must_use]
    pub fn new(config: RendererConfig, schema: Arc<Schema>, source: Box<dyn TemplateSource>) -> Self {
        let finder = ViewFinder::new(&config.root, &config.view_paths, source);
        Self {
            config,
            schema,
            engine: TemplateEngine::new(),
            finder,
            caches: RenderCaches::new(),
            ids: Arc::new(IdAllocator::new()),
            executor: None,
        }
    }

    /// Shares an id allocator with other components.
    #[must_use]
    pub fn with_ids(mut self, ids: Arc<IdAllocator>) -> Self {
        self.ids = ids;
        self
    }

    /// Enables `@Type.op(...)` queries.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Replaces the format registry.
    #[must_use]
    pub fn with_engine(mut self, engine: TemplateEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Settings.
    #[must_use]
    pub const fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Metamodel.
    #[must_use]
    pub const fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Format registry.
    #[must_use]
    pub const fn engine(&self) -> &TemplateEngine {
        &self.engine
    }

    /// Template finder.
    #[must_use]
    pub const fn finder(&self) -> &ViewFinder {
        &self.finder
    }

    /// Rendering caches.
    #[must_use]
    pub const fn caches(&self) -> &RenderCaches {
        &self.caches
    }

    /// Node id allocator.
    #[must_use]
    pub const fn ids(&self) -> &Arc<IdAllocator> {
        &self.ids
    }

    /// Query hook, if configured.
    #[must_use]
    pub fn executor(&self) -> Option<&Arc<dyn QueryExecutor>> {
        self.executor.as_ref()
    }

    /// Clears the rendering caches.
    pub fn clear_caches(&self) {
        self.caches.clear_all();
    }

    fn compile_cached(&self, name: &str, content: &str, formats: &[String]) -> ViewResult<TemplateRef> {
        let key = (formats.to_vec(), content.to_owned());
        self.caches.content.fetch(&key, self.config.no_content_cache, || {
            self.engine.compile(name, content, formats, &self.ids)
        })
    }

    fn compile_file(&self, found: &FoundTemplate, formats: Option<&[String]>) -> ViewResult<TemplateRef> {
        let formats = formats.unwrap_or(found.formats.as_slice());
        let key = format!("{}:{}", formats.concat(), found.location);
        self.caches.file.fetch(&key, self.config.no_file_cache, || {
            let content = self.finder.read(&found.location)?;
            tracing::debug!(location = %found.location, ?formats, "compiling template file");
            self.engine.compile(&found.template, &content, formats, &self.ids)
        })
    }
}

impl std::fmt::Debug for ViewContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewContext")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .field("finder", &self.finder)
            .field("caches", &self.caches)
            .finish_non_exhaustive()
    }
}

/// Outcome of re-rendering one node.
#[derive(Debug)]
pub enum Rerendered {
    /// The node is constant or has nothing to re-execute.
    Unchanged,
    /// Fresh fragment whose root replaces the node.
    Fragment(RenderTree),
}

/// Entry point for render and re-render passes.
#[derive(Debug, Clone)]
pub struct ViewRenderer {
    ctx: Arc<ViewContext>,
}

impl ViewRenderer {
    /// Creates a renderer over `ctx`.
    #[must_use]
    pub const fn new(ctx: Arc<ViewContext>) -> Self {
        Self { ctx }
    }

    /// The shared context.
    #[must_use]
    pub const fn context(&self) -> &Arc<ViewContext> {
        &self.ctx
    }

    /// Renders `request` into a new tree with a composite root.
    ///
    /// `policy` is the outermost field interceptor, usually the active
    /// principal's policy guard.
    ///
    /// # Errors
    ///
    /// Resolution, compilation, access and protocol failures abort the pass.
    pub fn render(&self, request: RenderRequest, policy: Option<&mut dyn FieldInterceptor>) -> ViewResult<RenderTree> {
        self.render_with(request, policy, None)
    }

    /// [`render`](Self::render), subscribing each node through `live` the
    /// first time it observes a record or queries a type.
    ///
    /// # Errors
    ///
    /// Same as [`render`](Self::render). Subscriptions already taken stay
    /// registered in `live`; the caller releases them.
    pub fn render_with(
        &self,
        request: RenderRequest,
        policy: Option<&mut dyn FieldInterceptor>,
        live: Option<&LiveSubscriptions>,
    ) -> ViewResult<RenderTree> {
        let mut pass = RenderPass::new(&self.ctx, policy, live);
        let root = pass.open_node(NodeKind::Composite, "root")?;
        pass.render(request)?;
        pass.builder.close(root)?;
        let tree = pass.finish()?;
        tracing::debug!(nodes = tree.len(), "render pass complete");
        Ok(tree)
    }

    /// Re-executes node `id` of `tree` with its saved template and
    /// bindings. The tree is not modified; the caller swaps the fragment in.
    ///
    /// # Errors
    ///
    /// Fails if `id` is unknown or the template fails.
    pub fn rerender_node(
        &self,
        tree: &RenderTree,
        id: NodeId,
        policy: Option<&mut dyn FieldInterceptor>,
    ) -> ViewResult<Rerendered> {
        self.rerender_node_with(tree, id, policy, None)
    }

    /// [`rerender_node`](Self::rerender_node) with live subscriptions, as
    /// in [`render_with`](Self::render_with).
    ///
    /// # Errors
    ///
    /// Same as [`rerender_node`](Self::rerender_node).
    pub fn rerender_node_with(
        &self,
        tree: &RenderTree,
        id: NodeId,
        policy: Option<&mut dyn FieldInterceptor>,
        live: Option<&LiveSubscriptions>,
    ) -> ViewResult<Rerendered> {
        let node = tree.node(id)?;
        let Some(template) = node.template().filter(|t| t.needs_binding_context()) else {
            return Ok(Rerendered::Unchanged);
        };
        let mut pass = RenderPass::new(&self.ctx, policy, live);
        let root = pass.open_node(node.kind(), node.source())?;
        pass.run(template, Arc::clone(node.bindings()), Arc::clone(node.view()), None)?;
        pass.builder.close(root)?;
        tracing::trace!(node = %id, template = template.name(), "re-rendered node");
        Ok(Rerendered::Fragment(pass.finish()?))
    }
}

/// State of one render pass; the binding context templates execute
/// against.
pub struct RenderPass<'a> {
    ctx: &'a ViewContext,
    builder: TreeBuilder,
    frames: Vec<Arc<Bindings>>,
    views: Vec<Arc<str>>,
    dirs: Vec<String>,
    policy: Option<&'a mut dyn FieldInterceptor>,
    live: Option<&'a LiveSubscriptions>,
}

impl<'a> RenderPass<'a> {
    fn new<'p: 'a>(
        ctx: &'a ViewContext,
        policy: Option<&'p mut (dyn FieldInterceptor + 'p)>,
        live: Option<&'a LiveSubscriptions>,
    ) -> Self {
        Self {
            ctx,
            builder: TreeBuilder::new(),
            frames: Vec::new(),
            views: Vec::new(),
            dirs: Vec::new(),
            policy: policy.map(|p| p as &'a mut dyn FieldInterceptor),
            live,
        }
    }

    fn listen(&self, node: NodeId, topic: Topic) {
        if let Some(live) = self.live {
            live.listen(node, topic);
        }
    }

    fn finish(self) -> ViewResult<RenderTree> {
        Ok(self.builder.finish()?)
    }

    /// The shared context.
    #[must_use]
    pub const fn context(&self) -> &ViewContext {
        self.ctx
    }

    /// Node id allocator.
    #[must_use]
    pub fn ids(&self) -> &IdAllocator {
        &self.ctx.ids
    }

    /// Locals of the innermost template.
    #[must_use]
    pub fn bindings(&self) -> Arc<Bindings> {
        self.frames.last().cloned().unwrap_or_default()
    }

    /// Looks a local up.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::UnboundLocal`] if `name` is not bound.
    pub fn local(&self, name: &str) -> ViewResult<Value> {
        self.frames
            .last()
            .and_then(|f| f.get(name))
            .cloned()
            .ok_or_else(|| ViewError::UnboundLocal(name.to_owned()))
    }

    /// View in effect.
    #[must_use]
    pub fn current_view(&self) -> Arc<str> {
        self.views
            .last()
            .cloned()
            .unwrap_or_else(|| Arc::from(self.ctx.config.default_view.as_str()))
    }

    /// Reads a field through the policy guard and the open node's
    /// dependency set, in that order.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::Access`] on a policy violation.
    pub fn read_field(&mut self, record: &RecordRef, field: &str) -> ViewResult<Value> {
        let key = record.key();
        let field = self.ctx.schema.resolve(key.type_name(), field);
        let node = self.builder.current()?;
        let deps = self.builder.current_mut()?.deps_mut();
        let first = !deps.depends_on(&key);
        let value = match self.policy.as_deref_mut() {
            Some(policy) => {
                let mut chain: [&mut dyn FieldInterceptor; 2] = [policy, deps];
                read_through(&mut chain, &**record, &field)?
            }
            None => {
                let mut chain: [&mut dyn FieldInterceptor; 1] = [deps];
                read_through(&mut chain, &**record, &field)?
            }
        };
        if first {
            self.listen(node, Topic::Record(key));
        }
        Ok(value)
    }

    /// Writes a field through the same chain; the written value is
    /// recorded as an access of the open node.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::Access`] on a policy violation or record failure.
    pub fn write_field(&mut self, record: &RecordRef, field: &str, value: Value) -> ViewResult<()> {
        let key = record.key();
        let field = self.ctx.schema.resolve(key.type_name(), field);
        let node = self.builder.current()?;
        let deps = self.builder.current_mut()?.deps_mut();
        let first = !deps.depends_on(&key);
        match self.policy.as_deref_mut() {
            Some(policy) => {
                let mut chain: [&mut dyn FieldInterceptor; 2] = [policy, deps];
                write_through(&mut chain, &**record, &field, value)?;
            }
            None => {
                let mut chain: [&mut dyn FieldInterceptor; 1] = [deps];
                write_through(&mut chain, &**record, &field, value)?;
            }
        }
        if first {
            self.listen(node, Topic::Record(key));
        }
        Ok(())
    }

    /// Executes a query and records it against the open node.
    ///
    /// # Errors
    ///
    /// Fails if no executor is configured or the query fails.
    pub fn query(&mut self, target: QueryTarget, op: &str, args: Vec<Value>) -> ViewResult<Value> {
        let executor = self.ctx.executor.as_ref().ok_or_else(|| RecordError::UnsupportedQuery {
            target: target.to_string(),
            op: op.to_owned(),
        })?;
        let result = executor.execute(&target, op, &args)?;
        let node = self.builder.current()?;
        self.listen(node, Topic::Type(Arc::from(target.type_name())));
        self.builder
            .current_mut()?
            .deps_mut()
            .record_query(Query::new(target, op, args, result.clone()));
        Ok(result)
    }

    /// Renders `request` into the open node. Collections open one
    /// composite node per element.
    ///
    /// # Errors
    ///
    /// Resolution, compilation, access and protocol failures.
    pub fn render(&mut self, request: RenderRequest) -> ViewResult<()> {
        let current_view = self.views.last().cloned();
        let inherited = self.bindings();
        let normalized = request.normalize(
            current_view.as_deref(),
            &self.ctx.config.default_view,
            &self.ctx.schema,
            &inherited,
        );
        match &normalized.target {
            RenderTarget::Nothing => Ok(()),
            RenderTarget::Collection(items) => {
                let name = normalized.template.as_deref().unwrap_or("collection");
                for item in items {
                    let id = self.open_node(NodeKind::Composite, name)?;
                    self.render(normalized.element(item.clone()))?;
                    self.builder.close(id)?;
                }
                Ok(())
            }
            _ => {
                let (template, dir) = self.resolve(&normalized)?;
                let view: Arc<str> = Arc::from(normalized.view.as_str());
                self.run(&template, Arc::clone(&normalized.locals), view, dir)
            }
        }
    }

    /// Runs `template` as a child node of its own kind, bound to the
    /// current locals, so it can be re-executed in isolation.
    ///
    /// # Errors
    ///
    /// Propagates the template's failure.
    pub fn fragment(&mut self, template: &TemplateRef) -> ViewResult<()> {
        let id = self.open_node(template.node_kind(), template.name())?;
        let bindings = self.bindings();
        let view = self.current_view();
        self.builder.current_mut()?.adopt_template(template, &bindings, &view);
        template.execute(self)?;
        self.builder.close(id)?;
        Ok(())
    }

    /// Appends a shared const node to the open node.
    ///
    /// # Errors
    ///
    /// Fails if the open node cannot take children.
    pub fn emit_const(&mut self, node: Arc<ConstNode>) -> ViewResult<()> {
        Ok(self.builder.emit_const(node)?)
    }

    /// Sets the literal output of the open node.
    ///
    /// # Errors
    ///
    /// Fails if the node has children or different output.
    pub fn set_output(&mut self, text: String) -> ViewResult<()> {
        Ok(self.builder.set_output(text)?)
    }

    /// Text rendered into the open node so far.
    ///
    /// # Errors
    ///
    /// Fails outside any node.
    pub fn current_text(&self) -> ViewResult<String> {
        let id = self.builder.current()?;
        Ok(self.builder.tree().result(id))
    }

    /// Marks a template stage boundary: the open node is collapsed so the
    /// next stage renders into a clean node that keeps every dependency.
    ///
    /// # Errors
    ///
    /// Fails outside any node.
    pub fn stage_boundary(&mut self) -> ViewResult<()> {
        let id = self.builder.current()?;
        self.builder.tree_mut().collapse(id)?;
        Ok(())
    }

    /// Compiles generated content with the given format chain.
    ///
    /// # Errors
    ///
    /// Compilation failures.
    pub fn compile_content(&self, name: &str, content: &str, formats: &[String]) -> ViewResult<TemplateRef> {
        self.ctx.compile_cached(name, content, formats)
    }

    /// Escapes `text` for HTML if the renderer is configured to.
    #[must_use]
    pub fn escape(&self, text: &str) -> String {
        if self.ctx.config.escape_html {
            escape_html(text)
        } else {
            text.to_owned()
        }
    }

    fn open_node(&mut self, kind: NodeKind, source: &str) -> ViewResult<NodeId> {
        let node = RenderNode::new(self.ctx.ids.next_node(), kind, source, self.current_view());
        Ok(self.builder.open(node)?)
    }

    fn run(&mut self, template: &TemplateRef, locals: Arc<Bindings>, view: Arc<str>, dir: Option<String>) -> ViewResult<()> {
        if template.needs_binding_context() {
            self.builder.current_mut()?.adopt_template(template, &locals, &view);
        }
        self.frames.push(locals);
        self.views.push(view);
        let pushed_dir = dir.is_some();
        if let Some(dir) = dir {
            self.dirs.push(dir);
        }
        let result = template.execute(self);
        if pushed_dir {
            self.dirs.pop();
        }
        self.views.pop();
        self.frames.pop();
        result
    }

    fn resolve(&self, request: &NormalizedRequest) -> ViewResult<(TemplateRef, Option<String>)> {
        let formats = request.formats.as_deref();
        match &request.target {
            RenderTarget::Text(text) => {
                let formats = formats.map_or_else(|| vec![".txt".to_owned()], <[String]>::to_vec);
                Ok((self.ctx.compile_cached("text", text, &formats)?, None))
            }
            RenderTarget::Inline(source) => {
                let formats = formats.map_or_else(|| vec![".erb".to_owned()], <[String]>::to_vec);
                Ok((self.ctx.compile_cached("inline", source, &formats)?, None))
            }
            RenderTarget::Compiled(template) => Ok((Arc::clone(template), None)),
            RenderTarget::File(path) => {
                let found = self.ctx.finder.find_file(path)?;
                Ok((self.ctx.compile_file(&found, formats)?, Some(dir_of(&found.location))))
            }
            RenderTarget::Template(_) | RenderTarget::Object(_) | RenderTarget::Nothing | RenderTarget::Collection(_) => {
                let found = self.find(request)?;
                Ok((self.ctx.compile_file(&found, formats)?, Some(dir_of(&found.location))))
            }
        }
    }

    fn find(&self, request: &NormalizedRequest) -> ViewResult<FoundTemplate> {
        let key = template_key(&request.view, &request.hierarchy);
        self.ctx.caches.template.fetch(&key, self.ctx.config.no_template_cache, || {
            let mut candidates = Vec::new();
            for name in &request.hierarchy {
                if let Some(dir) = self.dirs.last() {
                    match self.ctx.finder.find_in_folder(dir, name, request.partial) {
                        Ok(found) => return Ok(found),
                        Err(ViewError::TemplateNotFound { candidates: c, .. }) => candidates.extend(c),
                        Err(e) => return Err(e),
                    }
                }
                match self.ctx.finder.find_view(&request.view, name, request.partial) {
                    Ok(found) => {
                        tracing::debug!(view = %request.view, template = %name, location = %found.location, "template resolved");
                        return Ok(found);
                    }
                    Err(ViewError::TemplateNotFound { candidates: c, .. }) => candidates.extend(c),
                    Err(e) => return Err(e),
                }
            }
            Err(ViewError::TemplateNotFound {
                view: request.view.clone(),
                template: request.display_name(),
                candidates,
            })
        })
    }
}

impl std::fmt::Debug for RenderPass<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPass")
            .field("depth", &self.builder.depth())
            .field("views", &self.views)
            .field("policy", &self.policy.is_some())
            .field("live", &self.live.is_some())
            .finish_non_exhaustive()
    }
}

/// Escapes the HTML special characters of `text`.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
