//! Users and teams

use super::{
    description_attribute, name_attribute, reference_list_attribute, Descriptor, ResourceState,
};
use crate::error::Result;
use crate::resolver::{ParentRef, Resolved};
use crate::schema::{SchemaAttribute, SchemaBlock};
use crate::validators::Validator;
use kowabunga_common::models;
use kowabunga_common::Kind;
use serde_json::json;

pub const USER_ROLES: &[&str] = &["superAdmin", "projectAdmin", "user"];

pub struct User;

impl Descriptor for User {
    type Wire = models::User;

    const TYPE_NAME: &'static str = "kowabunga_user";
    const KIND: Kind = Kind::User;
    const DESCRIPTION: &'static str = "Manages a Kowabunga user account";

    fn schema() -> SchemaBlock {
        SchemaBlock::new()
            .with_attribute("name", name_attribute("user"))
            .with_attribute(
                "email",
                SchemaAttribute::string()
                    .with_description("Email address of the user")
                    .required()
                    .validate(Validator::Email),
            )
            .with_attribute(
                "role",
                SchemaAttribute::string()
                    .with_description("Role of the user (superAdmin, projectAdmin or user)")
                    .with_default(json!("user"))
                    .validate(Validator::OneOf(USER_ROLES)),
            )
            .with_attribute(
                "notifications",
                SchemaAttribute::bool()
                    .with_description("Whether the user receives email notifications")
                    .with_default(json!(false)),
            )
    }

    fn to_wire(state: &ResourceState, _refs: &Resolved) -> Result<Self::Wire> {
        Ok(models::User {
            id: None,
            name: state.require_string("name")?,
            email: state.require_string("email")?,
            role: state.get_string("role").unwrap_or_else(|| "user".to_string()),
            notifications: state.get_bool("notifications").unwrap_or(false),
        })
    }

    fn from_wire(wire: &Self::Wire, state: &mut ResourceState) {
        state.set("name", json!(wire.name));
        state.set("email", json!(wire.email));
        state.set("role", json!(wire.role));
        state.set("notifications", json!(wire.notifications));
    }
}

pub struct Team;

impl Descriptor for Team {
    type Wire = models::Team;

    const TYPE_NAME: &'static str = "kowabunga_team";
    const KIND: Kind = Kind::Team;
    const DESCRIPTION: &'static str = "Manages a team of users";
    const REFS: &'static [ParentRef] = &[ParentRef::body_list("users", Kind::User)];

    fn schema() -> SchemaBlock {
        SchemaBlock::new()
            .with_attribute("name", name_attribute("team"))
            .with_attribute("desc", description_attribute("team"))
            .with_attribute("users", reference_list_attribute(Kind::User))
    }

    fn to_wire(state: &ResourceState, refs: &Resolved) -> Result<Self::Wire> {
        let mut users = refs.ids("users");
        users.sort();

        Ok(models::Team {
            id: None,
            name: state.require_string("name")?,
            description: state.get_string("desc"),
            users,
        })
    }

    fn from_wire(wire: &Self::Wire, state: &mut ResourceState) {
        state.set("name", json!(wire.name));
        state.set_opt_string("desc", wire.description.as_deref());
    }
}
