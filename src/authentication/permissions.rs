use crate::database::schema::UserRole;

use super::jwt::SessionData;

const ACTION_TABLE: &[(UserRole, &[ActionType])] = &[
    (
        UserRole::User,
        &[
            ActionType::CreateRecipes,
            ActionType::ManageOwnRecipes,
            ActionType::ManageOwnFavorites,
            ActionType::ManageOwnShoppingCart,
            ActionType::ManageOwnSubscriptions,
        ],
    ),
    (
        UserRole::Admin,
        &[
            ActionType::CreateRecipes,
            ActionType::ManageOwnRecipes,
            ActionType::ManageOwnFavorites,
            ActionType::ManageOwnShoppingCart,
            ActionType::ManageOwnSubscriptions,
            ActionType::ManageAllRecipes,
            ActionType::ManageCatalog,
        ],
    ),
];

#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum ActionType {
    CreateRecipes,

    ManageOwnRecipes,
    ManageOwnFavorites,
    ManageOwnShoppingCart,
    ManageOwnSubscriptions,

    ManageAllRecipes,
    /// Creating tags and ingredients.
    ManageCatalog,
}

impl ActionType {
    pub fn authorized_for(self, session: &SessionData) -> bool {
        ACTION_TABLE
            .iter()
            .find_map(|(role, actions)| {
                if &session.role != role {
                    return None;
                }

                Some(actions.contains(&self))
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(role: UserRole) -> SessionData {
        SessionData {
            user_id: 1,
            username: String::from("cook"),
            is_admin: role == UserRole::Admin,
            role,
        }
    }

    #[test]
    fn users_manage_their_own_things_only() {
        let session = session(UserRole::User);
        assert!(ActionType::CreateRecipes.authorized_for(&session));
        assert!(ActionType::ManageOwnFavorites.authorized_for(&session));
        assert!(!ActionType::ManageAllRecipes.authorized_for(&session));
        assert!(!ActionType::ManageCatalog.authorized_for(&session));
    }

    #[test]
    fn admins_hold_every_action() {
        let session = session(UserRole::Admin);
        assert!(ActionType::ManageAllRecipes.authorized_for(&session));
        assert!(ActionType::ManageCatalog.authorized_for(&session));
        assert!(session.authenticate(ActionType::ManageOwnRecipes).is_ok());
    }

    #[test]
    fn denied_action_is_a_permission_error() {
        let err = session(UserRole::User)
            .authenticate(ActionType::ManageCatalog)
            .unwrap_err();
        assert!(matches!(err, crate::error::ApiError::PermissionDenied(_)));
    }
}
