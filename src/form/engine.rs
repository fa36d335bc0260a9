use std::collections::{BTreeMap, VecDeque};
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::task::{Context, Poll};

use futures::task::noop_waker_ref;

use crate::config::Config;
use crate::id::{IdAllocator, NodeId};
use crate::value::ModelValue;

use super::binding::{ModelBinding, NativeForm};
use super::controller::{Form, FormOptions};
use super::display::{ErrorDisplayPolicy, NodeFlags};
use super::error::{FormError, FormResult};
use super::node::NodeKind;
use super::submit::{SubmitListener, SubmitState};
use super::validation::{
    AsyncValidator, ConfigurableValidator, Formatter as ViewFormatter, Parser, PendingValidation,
    Validator, Validity,
};

pub(crate) type Task = Box<dyn FnOnce(&Engine) -> FormResult<()> + Send + 'static>;

/// Registry context owning every node of one application's form trees.
///
/// Handles (`Form`, `Control`, ...) are cheap clones pointing into it.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    state: RwLock<EngineState>,
    tasks: Mutex<VecDeque<Task>>,
    pending: Mutex<Vec<PendingValidation>>,
}

#[derive(Default)]
pub(crate) struct EngineState {
    pub(crate) nodes: BTreeMap<NodeId, Node>,
    pub(crate) ids: IdAllocator,
}

pub(crate) enum Node {
    Control(ControlState),
    Binding(BindingState),
    Form(FormState),
    Group(GroupState),
}

pub(crate) struct ControlState {
    pub(crate) name: String,
    pub(crate) control_id: String,
    pub(crate) parent: NodeId,
    pub(crate) view_value: ModelValue,
    pub(crate) buffered_view: Option<ModelValue>,
    pub(crate) parsers: Vec<Parser>,
    pub(crate) formatters: Vec<ViewFormatter>,
    pub(crate) validators: BTreeMap<String, Validator>,
    pub(crate) configurables: BTreeMap<String, ConfigurableValidator>,
    pub(crate) async_validators: BTreeMap<String, AsyncValidator>,
    pub(crate) validity: BTreeMap<String, Validity>,
    pub(crate) error_messages: Vec<(String, String)>,
    pub(crate) custom_error: Option<String>,
    pub(crate) local_config: Config,
    pub(crate) model_options: BTreeMap<String, Config>,
    pub(crate) touched: bool,
    pub(crate) dirty: bool,
    pub(crate) disabled: bool,
    pub(crate) ticket: u64,
}

impl ControlState {
    pub(crate) fn new(name: &str, control_id: String, parent: NodeId) -> Self {
        Self {
            name: name.to_owned(),
            control_id,
            parent,
            view_value: ModelValue::Null,
            buffered_view: None,
            parsers: Vec::new(),
            formatters: Vec::new(),
            validators: BTreeMap::new(),
            configurables: BTreeMap::new(),
            async_validators: BTreeMap::new(),
            validity: BTreeMap::new(),
            error_messages: Vec::new(),
            custom_error: None,
            local_config: Config::map(),
            model_options: BTreeMap::new(),
            touched: false,
            dirty: false,
            disabled: false,
            ticket: 0,
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.validity
            .values()
            .all(|validity| *validity == Validity::Valid)
    }

    pub(crate) fn updates_on_blur(&self) -> bool {
        matches!(self.model_options.get("update_on"), Some(Config::Text(event)) if event == "blur")
    }
}

pub(crate) struct BindingState {
    pub(crate) name: String,
    pub(crate) parent: NodeId,
    pub(crate) binding: Arc<dyn ModelBinding>,
}

pub(crate) struct FormState {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) members: Vec<NodeId>,
    pub(crate) config: Config,
    pub(crate) model: BTreeMap<String, ModelValue>,
    pub(crate) snapshot: BTreeMap<String, ModelValue>,
    pub(crate) options: FormOptions,
    pub(crate) submit_state: SubmitState,
    pub(crate) enclosing_submits: usize,
    pub(crate) submitted: bool,
    pub(crate) dirty: bool,
    pub(crate) disabled: bool,
    pub(crate) disabled_before_submit: Option<bool>,
    pub(crate) native: Option<Arc<dyn NativeForm>>,
    pub(crate) listeners: Vec<SubmitListener>,
}

impl FormState {
    pub(crate) fn new(name: String, parent: Option<NodeId>, options: FormOptions) -> Self {
        Self {
            name,
            parent,
            members: Vec::new(),
            config: Config::map(),
            model: BTreeMap::new(),
            snapshot: BTreeMap::new(),
            options,
            submit_state: SubmitState::Idle,
            enclosing_submits: 0,
            submitted: false,
            dirty: false,
            disabled: false,
            disabled_before_submit: None,
            native: None,
            listeners: Vec::new(),
        }
    }

    pub(crate) fn is_submitting(&self) -> bool {
        self.submit_state != SubmitState::Idle || self.enclosing_submits > 0
    }
}

pub(crate) struct GroupState {
    pub(crate) name: String,
    pub(crate) parent: NodeId,
    pub(crate) members: Vec<NodeId>,
    pub(crate) config: Vec<Config>,
    pub(crate) overflow: VecDeque<ModelValue>,
    pub(crate) disabled: bool,
}

impl GroupState {
    pub(crate) fn new(name: &str, parent: NodeId) -> Self {
        Self {
            name: name.to_owned(),
            parent,
            members: Vec::new(),
            config: Vec::new(),
            overflow: VecDeque::new(),
            disabled: false,
        }
    }
}

impl Node {
    pub(crate) fn kind(&self) -> NodeKind {
        match self {
            Node::Control(_) | Node::Binding(_) => NodeKind::Control,
            Node::Form(_) => NodeKind::Form,
            Node::Group(_) => NodeKind::FormGroup,
        }
    }

    pub(crate) fn name(&self) -> &str {
        match self {
            Node::Control(control) => &control.name,
            Node::Binding(binding) => &binding.name,
            Node::Form(form) => &form.name,
            Node::Group(group) => &group.name,
        }
    }

    pub(crate) fn parent(&self) -> Option<NodeId> {
        match self {
            Node::Control(control) => Some(control.parent),
            Node::Binding(binding) => Some(binding.parent),
            Node::Form(form) => form.parent,
            Node::Group(group) => Some(group.parent),
        }
    }

    pub(crate) fn members(&self) -> &[NodeId] {
        match self {
            Node::Form(form) => &form.members,
            Node::Group(group) => &group.members,
            Node::Control(_) | Node::Binding(_) => &[],
        }
    }

    fn members_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match self {
            Node::Form(form) => Some(&mut form.members),
            Node::Group(group) => Some(&mut group.members),
            Node::Control(_) | Node::Binding(_) => None,
        }
    }

    fn locally_disabled(&self) -> bool {
        match self {
            Node::Control(control) => control.disabled,
            Node::Form(form) => form.disabled,
            Node::Group(group) => group.disabled,
            Node::Binding(_) => false,
        }
    }
}

impl EngineState {
    pub(crate) fn node(&self, id: NodeId) -> FormResult<&Node> {
        self.nodes.get(&id).ok_or(FormError::Detached(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> FormResult<&mut Node> {
        self.nodes.get_mut(&id).ok_or(FormError::Detached(id))
    }

    pub(crate) fn control(&self, id: NodeId) -> FormResult<&ControlState> {
        match self.node(id)? {
            Node::Control(control) => Ok(control),
            other => Err(unexpected(NodeKind::Control, other)),
        }
    }

    pub(crate) fn control_mut(&mut self, id: NodeId) -> FormResult<&mut ControlState> {
        match self.node_mut(id)? {
            Node::Control(control) => Ok(control),
            other => Err(unexpected(NodeKind::Control, other)),
        }
    }

    pub(crate) fn binding(&self, id: NodeId) -> FormResult<&BindingState> {
        match self.node(id)? {
            Node::Binding(binding) => Ok(binding),
            other => Err(unexpected(NodeKind::Control, other)),
        }
    }

    pub(crate) fn form(&self, id: NodeId) -> FormResult<&FormState> {
        match self.node(id)? {
            Node::Form(form) => Ok(form),
            other => Err(unexpected(NodeKind::Form, other)),
        }
    }

    pub(crate) fn form_mut(&mut self, id: NodeId) -> FormResult<&mut FormState> {
        match self.node_mut(id)? {
            Node::Form(form) => Ok(form),
            other => Err(unexpected(NodeKind::Form, other)),
        }
    }

    pub(crate) fn group(&self, id: NodeId) -> FormResult<&GroupState> {
        match self.node(id)? {
            Node::Group(group) => Ok(group),
            other => Err(unexpected(NodeKind::FormGroup, other)),
        }
    }

    pub(crate) fn group_mut(&mut self, id: NodeId) -> FormResult<&mut GroupState> {
        match self.node_mut(id)? {
            Node::Group(group) => Ok(group),
            other => Err(unexpected(NodeKind::FormGroup, other)),
        }
    }

    pub(crate) fn insert_form(
        &mut self,
        name: Option<&str>,
        parent: Option<NodeId>,
        options: FormOptions,
    ) -> (NodeId, String) {
        let name = match name {
            Some(name) => name.to_owned(),
            None => self.ids.form_name(),
        };
        let id = self.ids.node();
        self.nodes.insert(
            id,
            Node::Form(FormState::new(name.clone(), parent, options)),
        );
        (id, name)
    }

    /// First member of `parent` called `name` that passes `filter`.
    pub(crate) fn find_member(
        &self,
        parent: NodeId,
        name: &str,
        filter: impl Fn(&Node) -> bool,
    ) -> FormResult<Option<(NodeId, NodeKind)>> {
        for id in self.node(parent)?.members() {
            let node = self.node(*id)?;
            if node.name() == name && filter(node) {
                return Ok(Some((*id, node.kind())));
            }
        }
        Ok(None)
    }

    /// Members of `parent` paired with their names.
    pub(crate) fn named_members(&self, parent: NodeId) -> FormResult<Vec<(NodeId, String)>> {
        self.node(parent)?
            .members()
            .iter()
            .map(|id| Ok((*id, self.node(*id)?.name().to_owned())))
            .collect()
    }

    /// `id` followed by every node below it, depth first.
    pub(crate) fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(node) = self.nodes.get(&next) else {
                continue;
            };
            out.push(next);
            stack.extend(node.members().iter().rev().copied());
        }
        out
    }

    /// Forms (not groups) from `id` up to the root, starting at `id`.
    pub(crate) fn form_chain(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        while let Some(next) = cursor {
            let Some(node) = self.nodes.get(&next) else {
                break;
            };
            if matches!(node, Node::Form(_)) {
                chain.push(next);
            }
            cursor = node.parent();
        }
        chain
    }

    pub(crate) fn is_disabled(&self, id: NodeId) -> FormResult<bool> {
        let mut cursor = Some(id);
        while let Some(next) = cursor {
            let node = self.node(next)?;
            if node.locally_disabled() {
                return Ok(true);
            }
            cursor = node.parent();
        }
        Ok(false)
    }

    /// The value stored under a control's name in its form's model map.
    pub(crate) fn model_of(&self, control: NodeId) -> FormResult<Option<ModelValue>> {
        let control = self.control(control)?;
        Ok(self.form(control.parent)?.model.get(&control.name).cloned())
    }

    pub(crate) fn mark_dirty(&mut self, form: NodeId) {
        for id in self.form_chain(form) {
            if let Ok(form) = self.form_mut(id) {
                form.dirty = true;
            }
        }
    }

    pub(crate) fn display_policy(&self, form: NodeId) -> Option<&ErrorDisplayPolicy> {
        self.form_chain(form)
            .into_iter()
            .filter_map(|id| self.form(id).ok())
            .find_map(|form| form.options.show_errors_on.as_ref())
    }

    pub(crate) fn form_flags(&self, form: NodeId) -> NodeFlags {
        let chain = self.form_chain(form);
        NodeFlags {
            touched: false,
            submitted: chain
                .iter()
                .filter_map(|id| self.form(*id).ok())
                .any(|form| form.submitted),
            dirty: self.form(form).is_ok_and(|form| form.dirty),
        }
    }

    pub(crate) fn debug_enabled(&self, form: NodeId) -> bool {
        self.form_chain(form)
            .into_iter()
            .filter_map(|id| self.form(id).ok())
            .any(|form| form.options.debug)
    }
}

fn unexpected(expected: NodeKind, found: &Node) -> FormError {
    FormError::UnexpectedKind {
        expected,
        found: found.kind(),
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EngineInner {
                state: RwLock::new(EngineState::default()),
                tasks: Mutex::new(VecDeque::new()),
                pending: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Creates a top-level form. A missing name becomes `Form-<n>`.
    pub fn form(&self, name: Option<&str>, options: FormOptions) -> FormResult<Form> {
        let (id, name) = self
            .write_lock("creating form")?
            .insert_form(name, None, options);
        log::debug!("created form `{name}`");
        Ok(Form::new(self.clone(), id))
    }

    /// Runs deferred work until nothing is left to do.
    ///
    /// Drains the task queue and polls pending async validators once each
    /// round; stops when a round neither runs a task nor settles a validator.
    pub fn settle(&self) -> FormResult<()> {
        let mut cx = Context::from_waker(noop_waker_ref());
        self.flush(&mut cx)
    }

    pub fn pending_validations(&self) -> FormResult<usize> {
        Ok(lock(&self.inner.pending, "counting pending validations")?.len())
    }

    pub fn queued_tasks(&self) -> FormResult<usize> {
        Ok(lock(&self.inner.tasks, "counting deferred tasks")?.len())
    }

    pub fn contains(&self, id: NodeId) -> FormResult<bool> {
        Ok(self
            .read_lock("checking node registration")?
            .nodes
            .contains_key(&id))
    }

    pub(crate) fn read_lock(
        &self,
        context: &'static str,
    ) -> FormResult<RwLockReadGuard<'_, EngineState>> {
        self.inner
            .state
            .read()
            .map_err(|_| FormError::StatePoisoned(context))
    }

    pub(crate) fn write_lock(
        &self,
        context: &'static str,
    ) -> FormResult<RwLockWriteGuard<'_, EngineState>> {
        self.inner
            .state
            .write()
            .map_err(|_| FormError::StatePoisoned(context))
    }

    pub(crate) fn defer(
        &self,
        task: impl FnOnce(&Engine) -> FormResult<()> + Send + 'static,
    ) -> FormResult<()> {
        lock(&self.inner.tasks, "queueing deferred task")?.push_back(Box::new(task));
        Ok(())
    }

    fn run_tasks(&self) -> FormResult<usize> {
        let mut ran = 0;
        loop {
            let task = lock(&self.inner.tasks, "taking deferred task")?.pop_front();
            let Some(task) = task else {
                return Ok(ran);
            };
            task(self)?;
            ran += 1;
        }
    }

    fn flush(&self, cx: &mut Context<'_>) -> FormResult<()> {
        loop {
            let ran = self.run_tasks()?;
            let settled = self.poll_pending(cx)?;
            if ran == 0 && !settled {
                return Ok(());
            }
        }
    }

    /// Flushes, then reports whether any control under `root` still waits
    /// on an async validator. Pending futures were polled with `cx`.
    pub(crate) fn drive(&self, root: NodeId, cx: &mut Context<'_>) -> Poll<FormResult<()>> {
        if let Err(error) = self.flush(cx) {
            return Poll::Ready(Err(error));
        }
        match self.has_pending_under(root) {
            Ok(true) => Poll::Pending,
            Ok(false) => Poll::Ready(Ok(())),
            Err(error) => Poll::Ready(Err(error)),
        }
    }

    pub(crate) fn has_pending_under(&self, root: NodeId) -> FormResult<bool> {
        let subtree = self.read_lock("collecting subtree")?.subtree(root);
        Ok(lock(&self.inner.pending, "checking pending validations")?
            .iter()
            .any(|entry| subtree.contains(&entry.control)))
    }

    /// Replaces every pending validation of `control` with `pending`.
    pub(crate) fn replace_pending(
        &self,
        control: NodeId,
        pending: Vec<PendingValidation>,
    ) -> FormResult<()> {
        let mut queue = lock(&self.inner.pending, "replacing pending validations")?;
        queue.retain(|entry| entry.control != control);
        queue.extend(pending);
        Ok(())
    }

    /// Polls every pending validator once. Returns whether any finished.
    fn poll_pending(&self, cx: &mut Context<'_>) -> FormResult<bool> {
        let mut pending = std::mem::take(&mut *lock(
            &self.inner.pending,
            "taking pending validations",
        )?);
        if pending.is_empty() {
            return Ok(false);
        }

        let mut finished = Vec::new();
        pending.retain_mut(|entry| match entry.future.as_mut().poll(cx) {
            Poll::Ready(valid) => {
                finished.push((entry.control, entry.key.clone(), entry.ticket, valid));
                false
            }
            Poll::Pending => true,
        });

        {
            let state = self.read_lock("filtering stale validations")?;
            pending.retain(|entry| {
                state
                    .control(entry.control)
                    .is_ok_and(|control| control.ticket == entry.ticket)
            });
        }
        {
            let mut queue = lock(&self.inner.pending, "restoring pending validations")?;
            pending.retain(|entry| !queue.iter().any(|newer| newer.control == entry.control));
            pending.append(&mut queue);
            *queue = pending;
        }

        let settled = !finished.is_empty();
        let mut state = self.write_lock("finishing async validation")?;
        for (control, key, ticket, valid) in finished {
            let Ok(control) = state.control_mut(control) else {
                continue;
            };
            if control.ticket == ticket {
                control.validity.insert(key, Validity::from_outcome(valid));
            }
        }
        Ok(settled)
    }

    /// Removes `id` and its subtree from the arena and from its parent.
    pub(crate) fn detach(&self, id: NodeId) -> FormResult<Vec<NodeId>> {
        let removed = {
            let mut state = self.write_lock("detaching node")?;
            let parent = state.node(id)?.parent();
            if let Some(parent) = parent {
                if let Some(members) = state
                    .nodes
                    .get_mut(&parent)
                    .and_then(Node::members_mut)
                {
                    members.retain(|member| *member != id);
                }
            }
            let removed = state.subtree(id);
            for node in &removed {
                state.nodes.remove(node);
            }
            removed
        };
        lock(&self.inner.pending, "dropping detached validations")?
            .retain(|entry| !removed.contains(&entry.control));
        Ok(removed)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Engine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("nodes", &self.inner.state.read().map(|state| state.nodes.len()).ok())
            .finish_non_exhaustive()
    }
}

pub(crate) fn lock<'a, T>(
    lock: &'a Mutex<T>,
    context: &'static str,
) -> FormResult<MutexGuard<'a, T>> {
    lock.lock().map_err(|_| FormError::StatePoisoned(context))
}
