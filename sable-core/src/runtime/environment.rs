//! Scope frames and bindings
//!
//! Frames live in an arena owned by [`ScopeContext`] and are addressed by
//! [`FrameId`]. A scope frame resolves names locally and then through its
//! lexical parent. A closure frame resolves locally, then through the frame
//! its lambda captured, then through the caller.
//!
//! Popping a frame frees its slot unless a lambda captured it. Captured
//! frames stay in the arena until [`ScopeContext::collect`] finds that no
//! closure can reach them any more.

use crate::error::{Result, SableError};
use crate::parser::ast::Literal;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tracing::{debug, trace};

/// Popped captured frames tolerated before a collection runs
const MIN_COLLECT_THRESHOLD: usize = 256;

/// Handle to a frame in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(usize);

impl FrameId {
    pub const GLOBAL: FrameId = FrameId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// Shared handle held by every closure that captured a frame
#[derive(Debug, Clone)]
pub struct FrameRef(Rc<FrameId>);

impl FrameRef {
    pub fn id(&self) -> FrameId {
        *self.0
    }

    fn holders(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

/// A name's slot in a frame
#[derive(Debug, Clone)]
pub struct Binding {
    pub declared_type: String,
    pub value: Literal,
    pub dynamic: bool,
    pub mutable: bool,
}

/// `any` and `null` fit every type; other names compare case-insensitively
pub fn type_matches(declared: &str, value: &Literal) -> bool {
    value.is_null()
        || declared.eq_ignore_ascii_case("any")
        || declared.eq_ignore_ascii_case(&value.lang_type())
}

impl Binding {
    /// Create a binding. An explicit type must agree with the initial value
    /// unless the binding is dynamic.
    pub fn new(declared_type: Option<&str>, value: Literal, dynamic: bool, mutable: bool) -> Result<Self> {
        let declared_type = match declared_type {
            Some(ty) if !dynamic && !type_matches(ty, &value) => {
                return Err(SableError::binding(format!(
                    "Type mismatch: declared {} but value is {}",
                    ty,
                    value.lang_type()
                )))
            }
            Some(ty) => ty.to_string(),
            None if value.is_null() => "any".to_string(),
            None => value.lang_type(),
        };

        Ok(Binding {
            declared_type,
            value,
            dynamic,
            mutable,
        })
    }

    /// Replace the value; the binding takes on the new value's type.
    /// `null` fits any binding and leaves its type unchanged.
    pub fn reassign(&mut self, value: Literal) -> Result<()> {
        if !self.mutable {
            return Err(SableError::binding("Reassignment of final value"));
        }
        if !self.dynamic && !type_matches(&self.declared_type, &value) {
            return Err(SableError::binding(format!(
                "Type mismatch: cannot assign {} to binding of type {}",
                value.lang_type(),
                self.declared_type
            )));
        }
        if !value.is_null() {
            self.declared_type = value.lang_type();
        }
        self.value = value;
        Ok(())
    }
}

#[derive(Debug)]
struct Frame {
    bindings: HashMap<String, Binding>,
    /// Lexical parent for scopes, caller for closures
    parent: Option<FrameId>,
    /// Defining frame of the lambda being invoked
    captured: Option<FrameId>,
    /// Present once a lambda captured this frame
    anchor: Option<FrameRef>,
    /// Survives its pop; set on captured frames and their ancestors
    retained: bool,
    /// Pushed and not yet popped
    active: bool,
}

impl Frame {
    fn new(parent: Option<FrameId>, captured: Option<FrameId>) -> Self {
        Frame {
            bindings: HashMap::new(),
            parent,
            captured,
            anchor: None,
            retained: false,
            active: true,
        }
    }
}

/// Owns every frame and tracks the current one
#[derive(Debug)]
pub struct ScopeContext {
    frames: Vec<Option<Frame>>,
    free: Vec<usize>,
    current: FrameId,
    depth: usize,
    /// Retained frames popped since the last collection
    popped_retained: usize,
    collect_threshold: usize,
}

impl ScopeContext {
    /// Create a context holding only the global frame
    pub fn new() -> Self {
        let mut global = Frame::new(None, None);
        global.retained = true;
        ScopeContext {
            frames: vec![Some(global)],
            free: Vec::new(),
            current: FrameId::GLOBAL,
            depth: 0,
            popped_retained: 0,
            collect_threshold: MIN_COLLECT_THRESHOLD,
        }
    }

    pub fn current(&self) -> FrameId {
        self.current
    }

    /// Number of frames pushed above the global frame
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Frames currently occupying arena slots
    pub fn live_frames(&self) -> usize {
        self.frames.iter().filter(|f| f.is_some()).count()
    }

    fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(id.0).and_then(Option::as_ref)
    }

    fn frame_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.frames.get_mut(id.0).and_then(Option::as_mut)
    }

    fn allocate(&mut self, frame: Frame) -> FrameId {
        match self.free.pop() {
            Some(index) => {
                self.frames[index] = Some(frame);
                FrameId(index)
            }
            None => {
                self.frames.push(Some(frame));
                FrameId(self.frames.len() - 1)
            }
        }
    }

    /// Push a block scope whose parent is the current frame
    pub fn push_scope(&mut self) -> FrameId {
        let id = self.allocate(Frame::new(Some(self.current), None));
        trace!(frame = id.0, parent = self.current.0, "push scope");
        self.current = id;
        self.depth += 1;
        id
    }

    /// Push a call frame for a lambda that captured `captured`
    pub fn push_closure_scope(&mut self, captured: FrameId) -> FrameId {
        let id = self.allocate(Frame::new(Some(self.current), Some(captured)));
        trace!(frame = id.0, caller = self.current.0, captured = captured.0, "push closure scope");
        self.current = id;
        self.depth += 1;
        id
    }

    /// Return to the parent of the current frame
    pub fn pop_scope(&mut self) -> Result<()> {
        if self.current == FrameId::GLOBAL {
            return Err(SableError::binding("Attempting to pop the global environment"));
        }

        let popped = self.current;
        let (parent, retained) = match self.frame(popped) {
            Some(frame) => (frame.parent.unwrap_or(FrameId::GLOBAL), frame.retained),
            None => return Err(SableError::binding("Current frame is no longer live")),
        };

        if retained {
            if let Some(frame) = self.frame_mut(popped) {
                frame.active = false;
            }
            self.popped_retained += 1;
        } else {
            self.release(popped.0);
        }
        trace!(frame = popped.0, retained, "pop scope");
        self.current = parent;
        self.depth = self.depth.saturating_sub(1);

        if self.popped_retained >= self.collect_threshold {
            self.collect();
        }
        Ok(())
    }

    fn release(&mut self, index: usize) {
        self.frames[index] = None;
        self.free.push(index);
    }

    /// Hand out the anchor of `id`, keeping it and everything it can see
    /// alive after being popped
    pub fn capture(&mut self, id: FrameId) -> Result<FrameRef> {
        let frame = self
            .frame_mut(id)
            .ok_or_else(|| SableError::binding("Captured frame is no longer live"))?;
        let anchor = frame.anchor.get_or_insert_with(|| FrameRef(Rc::new(id))).clone();

        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(frame) = self.frame_mut(next) {
                if frame.retained && next != id {
                    continue;
                }
                frame.retained = true;
                pending.extend(frame.parent);
                pending.extend(frame.captured);
            }
        }
        Ok(anchor)
    }

    /// Free popped frames no live closure can reach, returning how many
    ///
    /// Roots are the frames still on the stack and any frame whose anchor
    /// or closure is held outside the arena (by the evaluator or a host
    /// object). Closures stored in bindings only keep their frame alive
    /// while the binding's own frame is reachable, so cycles through a
    /// frame's own bindings are freed too.
    pub fn collect(&mut self) -> usize {
        let graph = ValueGraph::scan(
            self.frames
                .iter()
                .flatten()
                .flat_map(|frame| frame.bindings.values().map(|binding| &binding.value)),
        );

        let mut pending: Vec<usize> = Vec::new();
        for (index, slot) in self.frames.iter().enumerate() {
            let Some(frame) = slot else { continue };
            let externally_held = frame
                .anchor
                .as_ref()
                .is_some_and(|anchor| anchor.holders() > 1 + graph.anchor_refs(index));
            if frame.active || externally_held {
                pending.push(index);
            }
        }
        pending.extend(graph.external_frames());

        let mut marked = HashSet::new();
        while let Some(index) = pending.pop() {
            if !marked.insert(index) {
                continue;
            }
            let Some(frame) = self.frames.get(index).and_then(Option::as_ref) else {
                continue;
            };
            pending.extend(frame.parent.map(FrameId::index));
            pending.extend(frame.captured.map(FrameId::index));
            for binding in frame.bindings.values() {
                pending.extend(graph.frames_reachable_from(&binding.value));
            }
        }

        let dead: Vec<usize> = self
            .frames
            .iter()
            .enumerate()
            .filter(|(index, slot)| slot.is_some() && !marked.contains(index))
            .map(|(index, _)| index)
            .collect();
        drop(graph);
        for &index in &dead {
            self.release(index);
        }

        let survivors = self.frames.iter().filter(|slot| {
            slot.as_ref().is_some_and(|frame| frame.retained && !frame.active)
        });
        self.popped_retained = 0;
        self.collect_threshold = MIN_COLLECT_THRESHOLD.max(2 * survivors.count());
        debug!(freed = dead.len(), live = self.live_frames(), "collected frames");
        dead.len()
    }

    /// Bind a new name in the current frame
    pub fn create_binding(&mut self, name: &str, binding: Binding) -> Result<()> {
        let current = self.current;
        let frame = self
            .frame_mut(current)
            .ok_or_else(|| SableError::binding("Current frame is no longer live"))?;

        if frame.bindings.contains_key(name) {
            return Err(SableError::binding(format!(
                "Redefinition of existing binding: {}",
                name
            )));
        }
        frame.bindings.insert(name.to_string(), binding);
        Ok(())
    }

    /// Find the frame that binds `name`, starting at `start`
    fn resolve(&self, start: FrameId, name: &str) -> Option<FrameId> {
        let frame = self.frame(start)?;
        if frame.bindings.contains_key(name) {
            return Some(start);
        }
        if let Some(found) = frame.captured.and_then(|captured| self.resolve(captured, name)) {
            return Some(found);
        }
        frame.parent.and_then(|parent| self.resolve(parent, name))
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        let owner = self.resolve(self.current, name)?;
        self.frame(owner).and_then(|frame| frame.bindings.get(name))
    }

    /// Value bound to `name`, or an unbound-symbol error
    pub fn lookup(&self, name: &str) -> Result<Literal> {
        self.get(name)
            .map(|binding| binding.value.clone())
            .ok_or_else(|| SableError::binding(format!("Unbound symbol: {}", name)))
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Reassign the nearest existing binding of `name`
    pub fn reassign(&mut self, name: &str, value: Literal) -> Result<()> {
        let owner = self
            .resolve(self.current, name)
            .ok_or_else(|| SableError::binding(format!("Unbound symbol: {}", name)))?;

        match self.frame_mut(owner).and_then(|frame| frame.bindings.get_mut(name)) {
            Some(binding) => binding.reassign(value),
            None => Err(SableError::binding(format!("Unbound symbol: {}", name))),
        }
    }

    /// Global bindings sorted by name
    pub fn global_bindings(&self) -> Vec<(&String, &Binding)> {
        let mut bindings: Vec<_> = self
            .frame(FrameId::GLOBAL)
            .map(|frame| frame.bindings.iter().collect())
            .unwrap_or_default();
        bindings.sort_by(|a, b| a.0.cmp(b.0));
        bindings
    }

    /// Drop every frame above global, used after a failed top-level form
    pub fn unwind_to_global(&mut self) {
        while self.current != FrameId::GLOBAL {
            if self.pop_scope().is_err() {
                self.current = FrameId::GLOBAL;
            }
        }
        self.depth = 0;
    }
}

/// Shared values reachable from bindings, keyed by allocation
struct ValueNode<'a> {
    value: &'a Literal,
    /// References to this allocation found inside the arena
    internal: usize,
    strong: usize,
}

/// Reference counts of the closures and lists stored in bindings
struct ValueGraph<'a> {
    nodes: HashMap<usize, ValueNode<'a>>,
    /// Distinct stored closures per captured frame index
    closures_per_frame: HashMap<usize, usize>,
}

impl<'a> ValueGraph<'a> {
    fn scan(values: impl Iterator<Item = &'a Literal>) -> Self {
        let mut graph = ValueGraph {
            nodes: HashMap::new(),
            closures_per_frame: HashMap::new(),
        };
        let mut pending: Vec<&'a Literal> = values.collect();

        while let Some(value) = pending.pop() {
            let Some((key, strong)) = allocation(value) else {
                continue;
            };
            let node = graph.nodes.entry(key).or_insert(ValueNode {
                value,
                internal: 0,
                strong,
            });
            node.internal += 1;
            if node.internal > 1 {
                continue;
            }
            if let Literal::Lambda(closure) = value {
                *graph
                    .closures_per_frame
                    .entry(closure.frame.id().index())
                    .or_default() += 1;
            }
            pending.extend(children(value));
        }
        graph
    }

    fn anchor_refs(&self, index: usize) -> usize {
        self.closures_per_frame.get(&index).copied().unwrap_or(0)
    }

    /// Frames reachable from values also held outside the arena
    fn external_frames(&self) -> Vec<usize> {
        self.nodes
            .values()
            .filter(|node| node.strong > node.internal)
            .flat_map(|node| self.frames_reachable_from(node.value))
            .collect()
    }

    fn frames_reachable_from(&self, value: &Literal) -> Vec<usize> {
        let mut frames = Vec::new();
        let mut visited = HashSet::new();
        let mut pending = vec![value];
        while let Some(value) = pending.pop() {
            if let Some((key, _)) = allocation(value) {
                if !visited.insert(key) {
                    continue;
                }
            }
            if let Literal::Lambda(closure) = value {
                frames.push(closure.frame.id().index());
            }
            pending.extend(children(value));
        }
        frames
    }
}

/// Address and strong count of the shared allocation behind a value
fn allocation(value: &Literal) -> Option<(usize, usize)> {
    match value {
        Literal::Pair(pair) => Some((Rc::as_ptr(pair) as *const () as usize, Rc::strong_count(pair))),
        Literal::AList(items) => Some((Rc::as_ptr(items) as *const () as usize, Rc::strong_count(items))),
        Literal::Lambda(closure) => {
            Some((Rc::as_ptr(closure) as *const () as usize, Rc::strong_count(closure)))
        }
        _ => None,
    }
}

fn children(value: &Literal) -> Vec<&Literal> {
    match value {
        Literal::Pair(pair) => vec![&pair.car, &pair.cdr],
        Literal::AList(items) => items.iter().collect(),
        _ => Vec::new(),
    }
}

impl Default for ScopeContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn plain(value: Literal) -> Binding {
        Binding::new(None, value, false, true).unwrap()
    }

    #[test]
    fn test_define_and_lookup() {
        let mut ctx = ScopeContext::new();
        ctx.create_binding("x", plain(Literal::Int(1))).unwrap();
        assert_eq!(ctx.lookup("x").unwrap(), Literal::Int(1));
        assert!(ctx.lookup("y").is_err());
    }

    #[test]
    fn test_no_redefinition_in_same_frame() {
        let mut ctx = ScopeContext::new();
        ctx.create_binding("x", plain(Literal::Int(1))).unwrap();
        let err = ctx.create_binding("x", plain(Literal::Int(2))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Binding);
        assert!(err.message.contains("Redefinition"));

        ctx.push_scope();
        ctx.create_binding("x", plain(Literal::Int(2))).unwrap();
        assert_eq!(ctx.lookup("x").unwrap(), Literal::Int(2));
        ctx.pop_scope().unwrap();
        assert_eq!(ctx.lookup("x").unwrap(), Literal::Int(1));
    }

    #[test]
    fn test_reassignment_rules() {
        let mut ctx = ScopeContext::new();
        ctx.create_binding("fin", Binding::new(None, Literal::Int(1), false, false).unwrap())
            .unwrap();
        assert!(ctx.reassign("fin", Literal::Int(2)).unwrap_err().message.contains("final"));

        ctx.create_binding("typed", Binding::new(Some("int"), Literal::Int(1), false, true).unwrap())
            .unwrap();
        assert!(ctx
            .reassign("typed", Literal::string("s"))
            .unwrap_err()
            .message
            .contains("Type mismatch"));
        ctx.reassign("typed", Literal::Int(5)).unwrap();

        ctx.create_binding("dynamic", Binding::new(Some("int"), Literal::Int(1), true, true).unwrap())
            .unwrap();
        ctx.reassign("dynamic", Literal::string("s")).unwrap();
        assert_eq!(ctx.get("dynamic").unwrap().declared_type, "string");

        assert!(ctx.reassign("missing", Literal::Int(1)).is_err());
    }

    #[test]
    fn test_declared_type_checked_on_creation() {
        assert!(Binding::new(Some("string"), Literal::Int(1), false, true).is_err());
        assert!(Binding::new(Some("String"), Literal::string("a"), false, true).is_ok());
        assert!(Binding::new(Some("string"), Literal::Int(1), true, true).is_ok());
        assert!(Binding::new(Some("any"), Literal::Int(1), false, true).is_ok());
        assert!(Binding::new(Some("int"), Literal::Null, false, true).is_ok());
        assert_eq!(Binding::new(None, Literal::Null, false, true).unwrap().declared_type, "any");
    }

    #[test]
    fn test_pop_global_fails() {
        let mut ctx = ScopeContext::new();
        let err = ctx.pop_scope().unwrap_err();
        assert!(err.message.contains("global environment"));
    }

    #[test]
    fn test_closure_lookup_order() {
        let mut ctx = ScopeContext::new();

        // defining frame with a captured-only name
        let defining = ctx.push_scope();
        ctx.create_binding("shared", plain(Literal::string("captured"))).unwrap();
        ctx.create_binding("captured_only", plain(Literal::Int(1))).unwrap();
        let anchor = ctx.capture(defining).unwrap();
        ctx.pop_scope().unwrap();

        // call site with its own names
        ctx.push_scope();
        ctx.create_binding("shared", plain(Literal::string("caller"))).unwrap();
        ctx.create_binding("caller_only", plain(Literal::Int(2))).unwrap();

        ctx.push_closure_scope(anchor.id());
        ctx.create_binding("local", plain(Literal::Int(3))).unwrap();

        assert_eq!(ctx.lookup("local").unwrap(), Literal::Int(3));
        assert_eq!(ctx.lookup("shared").unwrap(), Literal::string("captured"));
        assert_eq!(ctx.lookup("captured_only").unwrap(), Literal::Int(1));
        assert_eq!(ctx.lookup("caller_only").unwrap(), Literal::Int(2));

        ctx.pop_scope().unwrap();
        ctx.pop_scope().unwrap();
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_frames_released_unless_captured() {
        let mut ctx = ScopeContext::new();
        ctx.push_scope();
        ctx.pop_scope().unwrap();
        assert_eq!(ctx.live_frames(), 1);

        // freed slot is reused
        let kept = ctx.push_scope();
        assert_eq!(kept.index(), 1);
        let anchor = ctx.capture(kept).unwrap();
        ctx.pop_scope().unwrap();
        assert_eq!(ctx.live_frames(), 2);

        ctx.push_scope();
        ctx.push_scope();
        assert_eq!(ctx.live_frames(), 4);
        ctx.unwind_to_global();
        assert_eq!(ctx.current(), FrameId::GLOBAL);
        assert_eq!(ctx.live_frames(), 2);

        // still held, so it survives a collection
        assert_eq!(ctx.collect(), 0);
        drop(anchor);
        assert_eq!(ctx.collect(), 1);
        assert_eq!(ctx.live_frames(), 1);
    }

    #[test]
    fn test_collect_keeps_frames_reachable_from_bindings() {
        let mut ctx = ScopeContext::new();

        // a closure stored in the global frame keeps its frame and parents
        let outer = ctx.push_scope();
        ctx.create_binding("o", plain(Literal::Int(1))).unwrap();
        let inner = ctx.push_scope();
        let anchor = ctx.capture(inner).unwrap();
        ctx.pop_scope().unwrap();
        ctx.pop_scope().unwrap();

        let closure = closure_over(anchor);
        ctx.create_binding("stored", plain(Literal::list(vec![closure]))).unwrap();

        assert_eq!(ctx.collect(), 0);
        assert_eq!(ctx.live_frames(), 3);
        assert!(ctx.frame(outer).is_some());
    }

    #[test]
    fn test_collect_frees_self_referencing_frames() {
        let mut ctx = ScopeContext::new();

        // the frame binds a closure that captured it, and nothing else does
        let frame = ctx.push_scope();
        let anchor = ctx.capture(frame).unwrap();
        let closure = closure_over(anchor);
        ctx.create_binding("me", Binding::new(Some("lambda"), closure, false, false).unwrap())
            .unwrap();
        ctx.pop_scope().unwrap();
        assert_eq!(ctx.live_frames(), 2);

        assert_eq!(ctx.collect(), 1);
        assert_eq!(ctx.live_frames(), 1);
    }

    #[test]
    fn test_collect_keeps_frames_of_closures_held_outside() {
        let mut ctx = ScopeContext::new();
        let frame = ctx.push_scope();
        let closure = closure_over(ctx.capture(frame).unwrap());
        ctx.create_binding("me", plain(closure.clone())).unwrap();
        ctx.pop_scope().unwrap();

        assert_eq!(ctx.collect(), 0);
        drop(closure);
        assert_eq!(ctx.collect(), 1);
    }

    #[test]
    fn test_reassign_takes_new_type() {
        let mut ctx = ScopeContext::new();
        ctx.create_binding("x", plain(Literal::Null)).unwrap();
        ctx.reassign("x", Literal::Int(5)).unwrap();
        assert_eq!(ctx.get("x").unwrap().declared_type, "int");
        assert!(ctx.reassign("x", Literal::string("s")).is_err());

        ctx.reassign("x", Literal::Null).unwrap();
        assert_eq!(ctx.get("x").unwrap().declared_type, "int");
        ctx.reassign("x", Literal::Int(6)).unwrap();
    }

    fn closure_over(frame: FrameRef) -> Literal {
        use crate::parser::ast::{Closure, LambdaDef, Node};
        Literal::Lambda(Rc::new(Closure {
            def: Rc::new(LambdaDef {
                modifiers: Vec::new(),
                params: Vec::new(),
                body: Box::new(Node::Literal(Literal::Void)),
                return_type: None,
            }),
            frame,
        }))
    }
}
