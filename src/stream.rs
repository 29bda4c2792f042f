use crate::document::Document;
use crate::error::ArborError;
use crate::node::{Container, ContainerKind, LineInfo, NodeId, NodeKind, NodeType};
use crate::token::{Token, TokenKind, TokenReader, TokenWriter};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineInfoHandling {
    #[default]
    Load,
    Ignore,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentHandling {
    #[default]
    Ignore,
    /// Keep comments as nodes. Comments inside objects, including one
    /// between a property name and its value, are still dropped because
    /// neither an object nor a property can hold a comment.
    Load,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePropertyNameHandling {
    /// The later property replaces the earlier one.
    #[default]
    Replace,
    /// The later property is read and dropped.
    Ignore,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct LoadSettings {
    pub line_info_handling: LineInfoHandling,
    pub comment_handling: CommentHandling,
    pub duplicate_property_name_handling: DuplicatePropertyNameHandling,
}

struct Frame {
    id: NodeId,
    pending_key: Option<(String, Option<LineInfo>)>,
    /// Property holding a dropped duplicate; freed when this frame closes.
    discard_on_close: Option<NodeId>,
}

impl Document {
    /// Writes the subtree at `id` to `writer` depth-first, pre-order.
    pub fn write_to<W>(&self, id: NodeId, writer: &mut W) -> Result<(), ArborError>
    where
        W: TokenWriter + ?Sized,
    {
        match &self.node(id)?.kind {
            NodeKind::Scalar(s) => writer.write_value(s),
            NodeKind::Comment(text) => writer.write_comment(text),
            NodeKind::Raw(text) => writer.write_raw(text),
            NodeKind::Property { key, value } => {
                writer.write_property_name(key)?;
                self.write_to(*value, writer)
            }
            NodeKind::Container(c) => {
                match &c.kind {
                    ContainerKind::Array => writer.write_start_array()?,
                    ContainerKind::Object => writer.write_start_object()?,
                    ContainerKind::Constructor { name } => writer.write_start_constructor(name)?,
                }
                for child in &c.children {
                    self.write_to(*child, writer)?;
                }
                match &c.kind {
                    ContainerKind::Array => writer.write_end_array(),
                    ContainerKind::Object => writer.write_end_object(),
                    ContainerKind::Constructor { .. } => writer.write_end_constructor(),
                }
            }
        }
    }

    /// Loads whichever node the reader is positioned on. The reader is left
    /// on the last token of that node.
    pub fn load<R>(&mut self, reader: &mut R, settings: Option<&LoadSettings>) -> Result<NodeId, ArborError>
    where
        R: TokenReader + ?Sized,
    {
        let defaults = LoadSettings::default();
        let settings = settings.unwrap_or(&defaults);
        prepare(reader, "node")?;
        if settings.comment_handling == CommentHandling::Ignore && !reader.move_to_content()? {
            return Err(ArborError::format(
                "Error reading node from reader: no content",
                reader.line_info(),
            ));
        }
        self.read_node(reader, settings)
    }

    pub fn load_constructor<R>(
        &mut self,
        reader: &mut R,
        settings: Option<&LoadSettings>,
    ) -> Result<NodeId, ArborError>
    where
        R: TokenReader + ?Sized,
    {
        self.load_expecting(reader, settings, TokenKind::StartConstructor, "constructor")
    }

    pub fn load_object<R>(&mut self, reader: &mut R, settings: Option<&LoadSettings>) -> Result<NodeId, ArborError>
    where
        R: TokenReader + ?Sized,
    {
        self.load_expecting(reader, settings, TokenKind::StartObject, "object")
    }

    pub fn load_array<R>(&mut self, reader: &mut R, settings: Option<&LoadSettings>) -> Result<NodeId, ArborError>
    where
        R: TokenReader + ?Sized,
    {
        self.load_expecting(reader, settings, TokenKind::StartArray, "array")
    }

    fn load_expecting<R>(
        &mut self,
        reader: &mut R,
        settings: Option<&LoadSettings>,
        expected: TokenKind,
        what: &str,
    ) -> Result<NodeId, ArborError>
    where
        R: TokenReader + ?Sized,
    {
        let defaults = LoadSettings::default();
        let settings = settings.unwrap_or(&defaults);
        prepare(reader, what)?;
        reader.move_to_content()?;

        let found = reader.token_kind();
        if found != expected {
            return Err(ArborError::format(
                format!("Error reading {what} from reader. Current reader item is not a {what}: {found}"),
                reader.line_info(),
            ));
        }
        self.read_node(reader, settings)
    }

    fn line_info_of<R>(reader: &R, settings: &LoadSettings) -> Option<LineInfo>
    where
        R: TokenReader + ?Sized,
    {
        match settings.line_info_handling {
            LineInfoHandling::Load => reader.line_info(),
            LineInfoHandling::Ignore => None,
        }
    }

    fn read_node<R>(&mut self, reader: &mut R, settings: &LoadSettings) -> Result<NodeId, ArborError>
    where
        R: TokenReader + ?Sized,
    {
        let line_info = Self::line_info_of(reader, settings);
        let token = reader
            .token()
            .cloned()
            .ok_or_else(|| ArborError::format("Unexpected end of content", line_info))?;

        let node = match token {
            Token::Value(s) => self.alloc(NodeKind::Scalar(s), line_info),
            Token::Comment(text) => self.alloc(NodeKind::Comment(text), line_info),
            Token::Raw(text) => self.alloc(NodeKind::Raw(text), line_info),
            Token::PropertyName(key) => {
                // Comments cannot be property values; skip them as objects do.
                if !reader.read()? || !reader.move_to_content()? {
                    return Err(ArborError::format(
                        format!("Unexpected end of content while loading property '{key}'"),
                        reader.line_info(),
                    ));
                }
                let value = self.read_node(reader, settings)?;
                let property = self.create_property(&key, value)?;
                self.set_line_info(property, line_info)?;
                property
            }
            Token::StartObject | Token::StartArray | Token::StartConstructor(_) => {
                self.read_container(reader, settings, token, line_info)?
            }
            Token::EndObject | Token::EndArray | Token::EndConstructor => {
                return Err(ArborError::format(
                    format!("Unexpected {} token while loading node", token.kind()),
                    line_info,
                ));
            }
        };
        trace!(%node, "loaded node");
        Ok(node)
    }

    fn start_container(&mut self, token: &Token, line_info: Option<LineInfo>) -> Result<NodeId, ArborError> {
        let kind = match token {
            Token::StartObject => ContainerKind::Object,
            Token::StartArray => ContainerKind::Array,
            Token::StartConstructor(name) => {
                if name.is_empty() {
                    return Err(ArborError::format("Constructor name cannot be empty", line_info));
                }
                ContainerKind::Constructor { name: name.clone() }
            }
            other => {
                return Err(ArborError::format(
                    format!("Unexpected {} token while starting container", other.kind()),
                    line_info,
                ));
            }
        };
        Ok(self.alloc(NodeKind::Container(Container::new(kind)), line_info))
    }

    fn read_container<R>(
        &mut self,
        reader: &mut R,
        settings: &LoadSettings,
        start: Token,
        line_info: Option<LineInfo>,
    ) -> Result<NodeId, ArborError>
    where
        R: TokenReader + ?Sized,
    {
        let root = self.start_container(&start, line_info)?;
        let mut stack = vec![Frame {
            id: root,
            pending_key: None,
            discard_on_close: None,
        }];

        loop {
            if !reader.read()? {
                return Err(ArborError::format(
                    format!(
                        "Unexpected end of content while loading {}",
                        self.node_type(root)?
                    ),
                    reader.line_info(),
                ));
            }
            let line_info = Self::line_info_of(reader, settings);
            let token = reader
                .token()
                .cloned()
                .ok_or_else(|| ArborError::format("Unexpected end of content", line_info))?;

            match token {
                Token::StartObject | Token::StartArray | Token::StartConstructor(_) => {
                    let child = self.start_container(&token, line_info)?;
                    let discard = self.attach_loaded(&mut stack, child, settings, line_info)?;
                    stack.push(Frame {
                        id: child,
                        pending_key: None,
                        discard_on_close: discard,
                    });
                }
                Token::EndObject | Token::EndArray | Token::EndConstructor => {
                    let Some(frame) = stack.pop() else {
                        return Err(ArborError::format("Unbalanced end token", line_info));
                    };
                    let open = self.node_type(frame.id)?;
                    let matches = matches!(
                        (&token, open),
                        (Token::EndObject, NodeType::Object)
                            | (Token::EndArray, NodeType::Array)
                            | (Token::EndConstructor, NodeType::Constructor)
                    );
                    if !matches {
                        return Err(ArborError::format(
                            format!("Unexpected {} token while loading {open}", token.kind()),
                            line_info,
                        ));
                    }
                    if let Some((key, _)) = frame.pending_key {
                        return Err(ArborError::format(
                            format!("Property '{key}' has no value"),
                            line_info,
                        ));
                    }
                    if let Some(holder) = frame.discard_on_close {
                        self.discard(holder)?;
                    }
                    if stack.is_empty() {
                        debug!(%root, "loaded container");
                        return Ok(root);
                    }
                }
                Token::PropertyName(key) => {
                    let Some(top) = stack.last_mut() else {
                        return Err(ArborError::format("Unbalanced property name", line_info));
                    };
                    if self.node_type(top.id)? != NodeType::Object {
                        return Err(ArborError::format(
                            format!("Unexpected property name '{key}' outside of an object"),
                            line_info,
                        ));
                    }
                    if let Some((pending, _)) = &top.pending_key {
                        return Err(ArborError::format(
                            format!("Property '{pending}' has no value"),
                            line_info,
                        ));
                    }
                    top.pending_key = Some((key, line_info));
                }
                Token::Comment(text) => {
                    if settings.comment_handling == CommentHandling::Ignore {
                        continue;
                    }
                    let in_object = match stack.last() {
                        Some(top) => self.node_type(top.id)? == NodeType::Object,
                        None => false,
                    };
                    if in_object {
                        continue;
                    }
                    let child = self.alloc(NodeKind::Comment(text), line_info);
                    self.attach_loaded(&mut stack, child, settings, line_info)?;
                }
                Token::Value(s) => {
                    let child = self.alloc(NodeKind::Scalar(s), line_info);
                    if let Some(holder) = self.attach_loaded(&mut stack, child, settings, line_info)? {
                        self.discard(holder)?;
                    }
                }
                Token::Raw(text) => {
                    let child = self.alloc(NodeKind::Raw(text), line_info);
                    if let Some(holder) = self.attach_loaded(&mut stack, child, settings, line_info)? {
                        self.discard(holder)?;
                    }
                }
            }
        }
    }

    /// Attaches a freshly read node to the innermost open container.
    /// Returns the detached property that holds it when the node belongs
    /// to a duplicate key that is being dropped.
    fn attach_loaded(
        &mut self,
        stack: &mut [Frame],
        child: NodeId,
        settings: &LoadSettings,
        line_info: Option<LineInfo>,
    ) -> Result<Option<NodeId>, ArborError> {
        let Some(top) = stack.last_mut() else {
            return Err(ArborError::format("Unbalanced token stream", line_info));
        };
        let parent = top.id;

        if self.node_type(parent)? != NodeType::Object {
            self.add(parent, child)?;
            return Ok(None);
        }

        let Some((key, key_line)) = top.pending_key.take() else {
            return Err(ArborError::format(
                "Expected a property name inside an object",
                line_info,
            ));
        };
        let property = self.create_property(&key, child)?;
        self.set_line_info(property, key_line)?;

        if let Some(existing) = self.property(parent, &key)? {
            match settings.duplicate_property_name_handling {
                DuplicatePropertyNameHandling::Replace => {
                    self.replace_with(existing, property)?;
                    self.discard(existing)?;
                    return Ok(None);
                }
                DuplicatePropertyNameHandling::Ignore => return Ok(Some(property)),
                DuplicatePropertyNameHandling::Error => {
                    return Err(ArborError::format(
                        format!("Property with the name '{key}' already exists in the current object"),
                        key_line,
                    ));
                }
            }
        }
        self.add(parent, property)?;
        Ok(None)
    }
}

/// Steps onto the first token if nothing has been read yet.
fn prepare<R>(reader: &mut R, what: &str) -> Result<(), ArborError>
where
    R: TokenReader + ?Sized,
{
    if reader.token_kind() == TokenKind::None && !reader.read()? {
        return Err(ArborError::format(
            format!("Error reading {what} from reader"),
            reader.line_info(),
        ));
    }
    Ok(())
}
