//! Components and the [`FnComponent`] callback result.
//!
//! A [`Component`] writes markup into a byte sink. An [`FnComponent`] pairs
//! an outbound [`Dispatch`] with an optional component and the listeners to
//! register once it reaches the client. Rendering happens on the session
//! handler's outbound loop, not in the callback.

use std::io::{self, Write};
use std::sync::Arc;

use fncmp_core::{
    ComponentId, ConnId, Dispatch, DispatchError, EventKind, EventListener, FnClass, FnRender, Function, HandlerId,
    Session, Tag,
};
use serde_json::Value;

use crate::callback::Callback;

/// Something that renders markup for a session.
pub trait Component: Send + Sync {
    /// Write markup for `session` into `out`.
    fn render(&self, session: &Session, out: &mut dyn Write) -> io::Result<()>;
}

impl<F> Component for F
where
    F: Fn(&Session, &mut dyn Write) -> io::Result<()> + Send + Sync,
{
    fn render(&self, session: &Session, out: &mut dyn Write) -> io::Result<()> {
        self(session, out)
    }
}

/// Static markup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Html(pub String);

impl Component for Html {
    fn render(&self, _session: &Session, out: &mut dyn Write) -> io::Result<()> {
        out.write_all(self.0.as_bytes())
    }
}

/// Strip newlines and tabs from rendered markup.
pub fn sanitize_html(html: &str) -> String {
    html.chars().filter(|c| !matches!(c, '\n' | '\t')).collect()
}

/// Wrap `markup` in a container carrying the component id and its listeners.
pub fn wrap_markup(id: &ComponentId, listeners: &[EventListener], markup: &str) -> Result<String, DispatchError> {
    let listeners = serde_json::to_string(listeners)?;
    Ok(format!(
        r#"<div id="{}" data-fncmp-listeners="{}">{markup}</div>"#,
        escape_attr(id.as_str()),
        escape_attr(&listeners)
    ))
}

fn escape_attr(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// A listener waiting to be registered when its component is published.
pub(crate) struct PendingListener {
    pub(crate) listener: EventListener,
    pub(crate) callback: Arc<dyn Callback>,
}

#[derive(Clone, Copy)]
enum Swap {
    Inner,
    Outer,
    Append,
    Prepend,
}

/// Result of a callback: one outbound dispatch plus what it needs to render.
pub struct FnComponent {
    pub(crate) id: ComponentId,
    pub(crate) dispatch: Dispatch,
    pub(crate) component: Option<Box<dyn Component>>,
    pub(crate) listeners: Vec<PendingListener>,
}

impl std::fmt::Debug for FnComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnComponent")
            .field("id", &self.id)
            .field("function", &self.dispatch.function)
            .field("has_component", &self.component.is_some())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl FnComponent {
    fn from_dispatch(dispatch: Dispatch) -> Self {
        Self {
            id: ComponentId::new(),
            dispatch,
            component: None,
            listeners: Vec::new(),
        }
    }

    /// Render `component` into the document body (inner swap by default).
    pub fn new(component: impl Component + 'static) -> Self {
        let mut fc = Self::none();
        fc.component = Some(Box::new(component));
        fc
    }

    /// Render static markup.
    pub fn html(markup: impl Into<String>) -> Self {
        Self::new(Html(markup.into()))
    }

    /// A render with nothing to render; dropped before publishing.
    pub fn none() -> Self {
        Self::from_dispatch(Dispatch::render(FnRender {
            tag: Some(Tag::Body),
            inner: true,
            ..FnRender::default()
        }))
    }

    /// Navigate the client to `url`.
    pub fn redirect(url: impl Into<String>) -> Self {
        Self::from_dispatch(Dispatch::redirect(url))
    }

    /// Call a client-registered function with `data`.
    pub fn custom(function: impl Into<String>, data: Value) -> Self {
        Self::from_dispatch(Dispatch::custom(function, data))
    }

    /// Report an error to the client.
    pub fn error(message: impl Into<String>) -> Self {
        Self::from_dispatch(Dispatch::error(message))
    }

    /// Report an engine error, keeping its code.
    pub fn from_error(err: &DispatchError) -> Self {
        Self::from_dispatch(Dispatch::from_error(err))
    }

    /// Add CSS classes to `target_id`.
    pub fn add_class<I, S>(target_id: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::class(target_id.into(), names, false)
    }

    /// Remove CSS classes from `target_id`.
    pub fn remove_class<I, S>(target_id: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::class(target_id.into(), names, true)
    }

    fn class<I, S>(target_id: String, names: I, remove: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_dispatch(Dispatch::class(FnClass {
            target_id,
            remove,
            names: names.into_iter().map(Into::into).collect(),
        }))
    }

    /// Server-originated liveness probe.
    pub fn ping() -> Self {
        Self::from_dispatch(Dispatch::ping())
    }

    fn target(mut self, target_id: Option<String>, tag: Option<Tag>, swap: Swap) -> Self {
        if let Some(render) = self.dispatch.render.as_mut() {
            render.target_id = target_id.unwrap_or_default();
            render.tag = tag;
            render.inner = matches!(swap, Swap::Inner);
            render.outer = matches!(swap, Swap::Outer);
            render.append = matches!(swap, Swap::Append);
            render.prepend = matches!(swap, Swap::Prepend);
        }
        self
    }

    /// Replace the children of element `target_id`.
    #[must_use]
    pub fn swap_inner(self, target_id: impl Into<String>) -> Self {
        self.target(Some(target_id.into()), None, Swap::Inner)
    }

    /// Replace element `target_id` itself.
    #[must_use]
    pub fn swap_outer(self, target_id: impl Into<String>) -> Self {
        self.target(Some(target_id.into()), None, Swap::Outer)
    }

    /// Append to the children of element `target_id`.
    #[must_use]
    pub fn append(self, target_id: impl Into<String>) -> Self {
        self.target(Some(target_id.into()), None, Swap::Append)
    }

    /// Prepend to the children of element `target_id`.
    #[must_use]
    pub fn prepend(self, target_id: impl Into<String>) -> Self {
        self.target(Some(target_id.into()), None, Swap::Prepend)
    }

    /// Replace the children of a document tag.
    #[must_use]
    pub fn swap_tag_inner(self, tag: Tag) -> Self {
        self.target(None, Some(tag), Swap::Inner)
    }

    /// Replace a document tag itself.
    #[must_use]
    pub fn swap_tag_outer(self, tag: Tag) -> Self {
        self.target(None, Some(tag), Swap::Outer)
    }

    /// Render `component` after any markup already set on the dispatch.
    #[must_use]
    pub fn with_component(mut self, component: impl Component + 'static) -> Self {
        self.component = Some(Box::new(component));
        self
    }

    /// Override the generated component id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ComponentId>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the dispatch label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.dispatch.label = label.into();
        self
    }

    /// Attach `callback` to `on` events inside this component.
    #[must_use]
    pub fn with_listener(self, on: EventKind, callback: impl Callback) -> Self {
        self.with_event_listener(EventListener::new(on), callback)
    }

    /// Attach a fully configured listener (action, method).
    #[must_use]
    pub fn with_event_listener(mut self, listener: EventListener, callback: impl Callback) -> Self {
        self.listeners.push(PendingListener {
            listener,
            callback: Arc::new(callback),
        });
        self
    }

    /// Component id used for the wrapping element.
    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    /// The outbound dispatch as built so far.
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Function of the outbound dispatch.
    pub fn function(&self) -> &Function {
        &self.dispatch.function
    }

    /// Listener descriptors that will be sent with the markup.
    pub fn listeners(&self) -> Vec<&EventListener> {
        self.listeners.iter().map(|p| &p.listener).collect()
    }

    pub(crate) fn stamped(mut self, conn_id: &ConnId, handler_id: &HandlerId) -> Self {
        self.dispatch = self.dispatch.stamped(conn_id, handler_id);
        self
    }
}

impl From<Dispatch> for FnComponent {
    fn from(dispatch: Dispatch) -> Self {
        Self::from_dispatch(dispatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{CallbackResult, Context};

    async fn noop(_ctx: Context) -> CallbackResult {
        Ok(FnComponent::none())
    }

    #[test]
    fn sanitize_strips_newlines_and_tabs() {
        assert_eq!(sanitize_html("<p>\n\tHi\n</p>"), "<p>Hi</p>");
        assert_eq!(sanitize_html("a b"), "a b");
        assert_eq!(sanitize_html(""), "");
    }

    #[test]
    fn html_component_writes_markup() {
        let mut buf = Vec::new();
        Html("<b>x</b>".into()).render(&Session::new("c"), &mut buf).unwrap();
        assert_eq!(buf, b"<b>x</b>");
    }

    #[test]
    fn closure_component_sees_session() {
        let component = |session: &Session, out: &mut dyn Write| write!(out, "<i>{}</i>", session.conn_id());
        let mut buf = Vec::new();
        component.render(&Session::new("conn-7"), &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "<i>conn-7</i>");
    }

    #[test]
    fn wrap_escapes_listener_json() {
        let listener = EventListener {
            id: "l-1".into(),
            on: EventKind::Click,
            action: String::new(),
            method: String::new(),
        };
        let wrapped = wrap_markup(&ComponentId::from("cmp-1"), &[listener], "<p>x</p>").unwrap();
        insta::assert_snapshot!(wrapped, @r#"<div id="cmp-1" data-fncmp-listeners="[{&quot;id&quot;:&quot;l-1&quot;,&quot;on&quot;:&quot;click&quot;,&quot;action&quot;:&quot;&quot;,&quot;method&quot;:&quot;&quot;}]"><p>x</p></div>"#);
    }

    #[test]
    fn default_target_is_body_inner() {
        let fc = FnComponent::html("<p/>");
        let render = fc.dispatch().render.as_ref().unwrap();
        assert_eq!(render.tag, Some(Tag::Body));
        assert!(render.inner);
        assert!(render.target_id.is_empty());
    }

    #[test]
    fn targeting_modes_are_exclusive() {
        let fc = FnComponent::html("x").swap_outer("box").append("list");
        let render = fc.dispatch().render.as_ref().unwrap();
        assert_eq!(render.target_id, "list");
        assert_eq!(render.tag, None);
        assert!(render.append);
        assert!(!render.outer && !render.inner && !render.prepend);

        let fc = FnComponent::html("x").swap_tag_outer(Tag::Main);
        let render = fc.dispatch().render.as_ref().unwrap();
        assert_eq!(render.tag, Some(Tag::Main));
        assert!(render.outer);
    }

    #[test]
    fn targeting_ignored_for_non_render() {
        let fc = FnComponent::redirect("/home").swap_inner("x");
        assert_eq!(fc.function(), &Function::Redirect);
        assert!(fc.dispatch().render.is_none());
    }

    #[test]
    fn class_builders() {
        let add = FnComponent::add_class("btn", ["active", "big"]);
        let class = add.dispatch().class.as_ref().unwrap();
        assert_eq!(class.names, vec!["active", "big"]);
        assert!(!class.remove);

        let remove = FnComponent::remove_class("btn", vec!["active".to_owned()]);
        assert!(remove.dispatch().class.as_ref().unwrap().remove);
    }

    #[test]
    fn listeners_and_ids() {
        let fc = FnComponent::html("<button>+</button>")
            .with_id("counter")
            .with_label("inc")
            .with_listener(EventKind::Click, noop)
            .with_event_listener(EventListener::new(EventKind::Submit).with_action("/save"), noop);
        assert_eq!(fc.id().as_str(), "counter");
        assert_eq!(fc.dispatch().label, "inc");
        let kinds: Vec<EventKind> = fc.listeners().iter().map(|l| l.on).collect();
        assert_eq!(kinds, vec![EventKind::Click, EventKind::Submit]);
        assert_eq!(fc.listeners()[1].action, "/save");
    }

    #[test]
    fn component_ids_are_unique() {
        assert_ne!(FnComponent::none().id(), FnComponent::none().id());
    }
}
