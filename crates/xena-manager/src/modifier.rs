//! Modifier operations

use xena_protocol::{ModifierAction, ModifierConfig, ModifierType, ObjectKind};

use crate::error::{XenaError, XenaResult};
use crate::object::{ModifierHandle, ObjectData};
use crate::session::Session;

/// Modifier view borrowed from a [`Session`]
pub struct Modifier<'a> {
    session: &'a mut Session,
    handle: ModifierHandle,
}

impl<'a> Modifier<'a> {
    pub(crate) fn new(session: &'a mut Session, handle: ModifierHandle) -> Self {
        Self { session, handle }
    }

    pub fn handle(&self) -> ModifierHandle {
        self.handle
    }

    pub fn modifier_type(&self) -> XenaResult<ModifierType> {
        self.session.tree().modifier_type(self.handle.id())
    }

    /// Position of the modifier within its family on the stream
    pub fn index(&self) -> XenaResult<u32> {
        let object = self.session.tree().get(self.handle.id())?;
        match object.kind() {
            ObjectKind::Modifier(_) => object
                .index()
                .ok_or_else(|| XenaError::ObjectNotFound(object.reference().to_string())),
            actual => Err(XenaError::WrongKind {
                reference: object.reference().to_string(),
                expected: ObjectKind::Modifier(ModifierType::Standard),
                actual,
            }),
        }
    }

    /// Write `config`; random modifiers get no range command
    pub async fn apply(&mut self, config: &ModifierConfig) -> XenaResult<()> {
        let modifier_type = self.modifier_type()?;
        self.session
            .set_attribute(self.handle, modifier_type.command(), &config.encode_fields())
            .await?;
        if let Some(range) = config.encode_range() {
            self.session
                .set_attribute(self.handle, modifier_type.range_command(), &range)
                .await?;
        }

        // Keep what the device now holds
        let mut stored = config.clone();
        stored.range = match config.action {
            ModifierAction::Random => None,
            _ => Some(config.range.unwrap_or_default()),
        };
        self.store(stored)
    }

    /// Read the configuration back from the device
    pub async fn refresh(&mut self) -> XenaResult<ModifierConfig> {
        let modifier_type = self.modifier_type()?;
        let fields = self
            .session
            .get_attribute(self.handle, modifier_type.command())
            .await?;

        let mut config = ModifierConfig::decode(&fields, None)?;
        if config.action != ModifierAction::Random {
            let range = self
                .session
                .get_attribute(self.handle, modifier_type.range_command())
                .await?;
            config = ModifierConfig::decode(&fields, Some(&range))?;
        }

        self.store(config.clone())?;
        Ok(config)
    }

    /// Cached configuration, read from the device if never seen
    pub async fn config(&mut self) -> XenaResult<ModifierConfig> {
        if let ObjectData::Modifier {
            config: Some(config),
        } = self.session.tree().get(self.handle.id())?.data()
        {
            return Ok(config.clone());
        }
        self.refresh().await
    }

    fn store(&mut self, config: ModifierConfig) -> XenaResult<()> {
        self.session.tree_mut().get_mut(self.handle.id())?.data = ObjectData::Modifier {
            config: Some(config),
        };
        Ok(())
    }
}
