//! An embedding of the interpreter.
//!
//! The instance owns the heap, the frame stack, the module registry, the
//! base library and the emitted vertex buffer. Modules and values inside
//! one instance must not be shared with another.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{Error, ErrorKind, RunResult};
use crate::frame::{Frame, FrameState};
use crate::heap::{Heap, HeapData, HeapId, HeapStats};
use crate::io::{PrintWriter, StdPrint};
use crate::modules;
use crate::parse::parse;
use crate::tokenize::tokenize;
use crate::types::module::{ModuleData, ModuleSource};
use crate::value::Value;

/// Per-vertex component counts. The total is the tuple length `emit`
/// expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexLayout {
    pub position: u8,
    pub uv: u8,
    pub normal: u8,
    pub color: u8,
}

impl VertexLayout {
    pub fn size(&self) -> usize {
        usize::from(self.position) + usize::from(self.uv) + usize::from(self.normal)
            + usize::from(self.color)
    }
}

impl Default for VertexLayout {
    fn default() -> Self {
        Self {
            position: 3,
            uv: 0,
            normal: 3,
            color: 0,
        }
    }
}

/// One interpreter embedding. See the crate docs for an overview.
pub struct Instance {
    pub(crate) heap: Heap,
    pub(crate) frames: Vec<Frame>,
    /// Loaded modules by import name; each entry owns one reference.
    /// Static modules are registered up front and found before any
    /// filesystem lookup.
    pub(crate) modules: IndexMap<String, HeapId>,
    /// The base library, consulted last during name resolution. The
    /// registry owns it; this is a plain alias.
    pub(crate) base: HeapId,
    search_paths: Vec<PathBuf>,
    /// Emitted vertices, flattened at `layout.size()` components each.
    pub(crate) vertices: Vec<f32>,
    pub(crate) layout: VertexLayout,
    pub(crate) print: Box<dyn PrintWriter>,
    pub(crate) rng: StdRng,
}

impl Default for Instance {
    fn default() -> Self {
        Self::new()
    }
}

impl Instance {
    pub fn new() -> Self {
        Self::with_print(Box::new(StdPrint))
    }

    /// Builds an instance that prints through `print`.
    pub fn with_print(print: Box<dyn PrintWriter>) -> Self {
        let mut heap = Heap::new();
        let mut registry = IndexMap::new();

        let base = modules::baselib::create(&mut heap);
        registry.insert("base".to_owned(), base);
        registry.insert("list".to_owned(), modules::listlib::create(&mut heap));
        registry.insert("map".to_owned(), modules::maplib::create(&mut heap));
        registry.insert("math".to_owned(), modules::mathlib::create(&mut heap));

        Self {
            heap,
            frames: Vec::new(),
            modules: registry,
            base,
            search_paths: vec![PathBuf::new()],
            vertices: Vec::new(),
            layout: VertexLayout::default(),
            print,
            rng: StdRng::from_entropy(),
        }
    }

    /// Adds a directory to the import search list.
    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.search_paths.contains(&path) {
            self.search_paths.push(path);
        }
    }

    pub fn layout(&self) -> VertexLayout {
        self.layout
    }

    pub fn set_layout(&mut self, layout: VertexLayout) {
        self.layout = layout;
    }

    /// The emitted vertex buffer, `layout().size()` floats per vertex.
    pub fn vertices(&self) -> &[f32] {
        &self.vertices
    }

    pub fn vertex_count(&self) -> usize {
        let size = self.layout.size();
        if size == 0 {
            0
        } else {
            self.vertices.len() / size
        }
    }

    /// Drains output collected by a capturing print writer.
    pub fn collected_output(&mut self) -> String {
        self.print.collected()
    }

    /// Pre-binds `name` to a string value in the base library, as the
    /// CLI's `--set` does.
    pub fn set_base_string(&mut self, name: &str, value: &str) {
        let globals = self.heap.module(self.base).globals;
        let value = self.heap.alloc_str(value);
        self.heap.map_insert(globals, name, value);
    }

    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    /// Tears the instance down and reports what is left on the heap.
    ///
    /// After a successful run this must come back with zero live objects;
    /// the reference-count tests assert exactly that.
    pub fn finish(mut self) -> HeapStats {
        while !self.frames.is_empty() {
            let pending = self.pop_frame();
            pending.drop_with_heap(&mut self.heap);
        }
        let registered: Vec<HeapId> = self.modules.values().copied().collect();
        self.modules.clear();
        for id in registered {
            self.heap.dec_ref(id);
        }
        self.heap.stats()
    }

    // ------------------------------------------------------------------
    // Frames

    /// Pushes a frame. `locals` ownership transfers to the frame; the
    /// module gains a reference for the frame's lifetime.
    pub(crate) fn push_frame(
        &mut self,
        module: HeapId,
        locals: HeapId,
        caller_name: Option<String>,
        caller_loc: Option<crate::error::CodeLoc>,
    ) {
        self.heap.inc_ref(module);
        self.frames.push(Frame {
            state: FrameState::Active,
            module,
            locals,
            value: None,
            caller_name,
            caller_loc,
        });
    }

    /// Pops the top frame, releasing its module and locals. Returns the
    /// frame's pending value (or null) for the caller to consume or drop.
    pub(crate) fn pop_frame(&mut self) -> Value {
        let frame = self.frames.pop().expect("frame stack underflow");
        self.heap.dec_ref(frame.module);
        self.heap.dec_ref(frame.locals);
        frame.value.unwrap_or(Value::Null)
    }

    // ------------------------------------------------------------------
    // Modules

    /// Registers a parsed module and returns its id. The registry owns
    /// the initial reference.
    fn register_module(
        &mut self,
        name: &str,
        source: Rc<ModuleSource>,
        root: Option<Rc<crate::ast::Node>>,
    ) -> HeapId {
        let globals = self.heap.alloc_map();
        let id = self.heap.allocate(HeapData::Module(ModuleData {
            name: name.to_owned(),
            source,
            root,
            globals,
            is_static: false,
        }));
        self.modules.insert(name.to_owned(), id);
        id
    }

    fn load_module(&mut self, name: &str, filename: &str, text: String) -> RunResult<HeapId> {
        let tokens = tokenize(&text, filename)?;
        let root = parse(&tokens, filename)?;
        let source = Rc::new(ModuleSource {
            name: name.to_owned(),
            filename: filename.to_owned(),
            text,
            tokens,
        });
        Ok(self.register_module(name, source, Some(root)))
    }

    /// Executes a module's body in a fresh base frame whose locals map is
    /// the module's globals map.
    fn run_module(&mut self, module: HeapId) -> RunResult<()> {
        let data = self.heap.module(module);
        let Some(root) = data.root.clone() else {
            return Ok(());
        };
        let globals = data.globals;
        self.heap.inc_ref(globals);
        self.push_frame(module, globals, None, None);
        let result = self.visit(module, &root);
        let pending = self.pop_frame();
        pending.drop_with_heap(&mut self.heap);
        let value = result?;
        value.drop_with_heap(&mut self.heap);
        Ok(())
    }

    /// Resolves an import name to a module value (a fresh reference).
    ///
    /// Statically registered modules and already-loaded modules are found
    /// by name; otherwise `a.b` maps to `a/b.mg` along the search list,
    /// and the module is parsed, registered and interpreted.
    pub(crate) fn import_module(&mut self, name: &str) -> RunResult<Value> {
        if let Some(&id) = self.modules.get(name) {
            self.heap.inc_ref(id);
            return Ok(Value::Ref(id));
        }

        let relative: PathBuf = format!("{}.mg", name.replace('.', "/")).into();
        let path = self
            .search_paths
            .iter()
            .map(|dir| dir.join(&relative))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| {
                Error::new(ErrorKind::Import, format!("Module \"{name}\" not found"))
            })?;

        let text = std::fs::read_to_string(&path)
            .map_err(|err| Error::io(format!("Failed reading \"{}\": {err}", path.display())))?;
        let filename = path.display().to_string();
        let id = self.load_module(name, &filename, text)?;
        self.run_module(id)?;
        self.heap.inc_ref(id);
        Ok(Value::Ref(id))
    }

    /// Runs a source string as a module registered under `name`.
    pub fn run_source(&mut self, text: &str, name: &str) -> Result<(), Error> {
        if let Some(&existing) = self.modules.get(name) {
            return self.run_module(existing);
        }
        let id = self.load_module(name, name, text.to_owned())?;
        self.run_module(id)
    }

    /// Reads and runs a source file. The module is registered under the
    /// path with its extension dropped and separators mapped to dots; the
    /// file's directory joins the import search list.
    pub fn run_file(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| Error::io(format!("Failed reading \"{}\": {err}", path.display())))?;

        if let Some(parent) = path.parent() {
            self.add_search_path(parent);
        }

        let name = module_name_for_path(path);
        if let Some(&existing) = self.modules.get(&name) {
            return self.run_module(existing);
        }
        let filename = path.display().to_string();
        let id = self.load_module(&name, &filename, text)?;
        self.run_module(id)
    }
}

/// `shapes/cube.mg` imports as `shapes.cube`.
fn module_name_for_path(path: &Path) -> String {
    let trimmed = path.with_extension("");
    trimmed
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(".")
}
