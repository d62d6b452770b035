use uuid::Uuid;

use super::repo_types::{Role, User, UserProfile};

pub const ALEX_ID: Uuid = Uuid::from_u128(1);
pub const SARAH_ID: Uuid = Uuid::from_u128(2);
pub const MICHAEL_ID: Uuid = Uuid::from_u128(3);
pub const EMILY_ID: Uuid = Uuid::from_u128(4);
pub const LISA_ID: Uuid = Uuid::from_u128(5);
pub const JORDAN_ID: Uuid = Uuid::from_u128(6);

/// Fixed user registry. Lookups are by normalized email.
#[derive(Debug, Clone)]
pub struct UserDirectory {
    users: Vec<User>,
}

impl UserDirectory {
    pub fn new(users: Vec<User>) -> Self {
        Self { users }
    }

    pub fn seeded() -> Self {
        let alex = User {
            id: ALEX_ID,
            name: "Alex Johnson".into(),
            email: "alex.student@school.edu".into(),
            role: Role::Student,
            profile: Some(UserProfile {
                interests: vec![
                    "Mathematics".into(),
                    "Physics".into(),
                    "Computer Science".into(),
                ],
                academic_goals: vec!["Improve Math grades".into(), "Learn programming".into()],
                language_preference: "English".into(),
                grade_level: Some("10th".into()),
                section: Some("A".into()),
                roll_number: Some("2024001".into()),
            }),
            linked_student: None,
        };
        let jordan = User {
            id: JORDAN_ID,
            name: "Jordan Lee".into(),
            email: "jordan.student@school.edu".into(),
            role: Role::Student,
            profile: Some(UserProfile {
                interests: vec!["Chemistry".into()],
                academic_goals: vec![],
                language_preference: "English".into(),
                grade_level: Some("10th".into()),
                section: Some("A".into()),
                roll_number: Some("2024002".into()),
            }),
            linked_student: None,
        };
        let staff = |id, name: &str, email: &str, role| User {
            id,
            name: name.into(),
            email: email.into(),
            role,
            profile: None,
            linked_student: None,
        };
        let mut emily = staff(EMILY_ID, "Emily Johnson", "emily.parent@gmail.com", Role::Parent);
        emily.linked_student = Some(ALEX_ID);

        Self::new(vec![
            alex,
            staff(SARAH_ID, "Sarah Wilson", "sarah.teacher@school.edu", Role::Teacher),
            staff(MICHAEL_ID, "Michael Brown", "michael.admin@school.edu", Role::Admin),
            emily,
            staff(LISA_ID, "Dr. Lisa Chen", "lisa.counselor@school.edu", Role::Counselor),
            jordan,
        ])
    }

    pub fn find_by_email(&self, email: &str) -> Option<&User> {
        let email = email.trim();
        self.users.iter().find(|u| u.email.eq_ignore_ascii_case(email))
    }

    pub fn get(&self, id: Uuid) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn students(&self) -> impl Iterator<Item = &User> {
        self.users.iter().filter(|u| u.role == Role::Student)
    }
}
