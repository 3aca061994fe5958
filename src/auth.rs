//! Mock credential table standing in for the real auth system.
//! Accounts are compiled in; passwords are plain text on purpose.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Teacher,
    Parent,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Parent => "parent",
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: &'static str,
    pub name: &'static str,
    pub role: Role,
    /// For parents: the studentId they are linked to.
    pub linked_student_id: Option<&'static str>,
}

impl User {
    pub fn can_manage(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Teacher)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

struct Account {
    user: User,
    password: &'static str,
}

fn accounts() -> &'static [Account] {
    const ACCOUNTS: &[Account] = &[
        Account {
            user: User {
                id: "u1",
                name: "Admin User",
                role: Role::Admin,
                linked_student_id: None,
            },
            password: "admin123",
        },
        Account {
            user: User {
                id: "u2",
                name: "Ms. Thompson",
                role: Role::Teacher,
                linked_student_id: None,
            },
            password: "teacher123",
        },
        Account {
            user: User {
                id: "u3",
                name: "Mr. Johnson",
                role: Role::Parent,
                linked_student_id: Some("STU001"),
            },
            password: "parent123",
        },
        Account {
            user: User {
                id: "u4",
                name: "Mrs. Smith",
                role: Role::Parent,
                linked_student_id: Some("STU002"),
            },
            password: "parent123",
        },
        Account {
            user: User {
                id: "u5",
                name: "Mr. White",
                role: Role::Parent,
                linked_student_id: Some("STU003"),
            },
            password: "parent123",
        },
        Account {
            user: User {
                id: "u6",
                name: "Mrs. Brown",
                role: Role::Parent,
                linked_student_id: Some("STU004"),
            },
            password: "parent123",
        },
        Account {
            user: User {
                id: "u7",
                name: "Mr. Davis",
                role: Role::Parent,
                linked_student_id: Some("STU005"),
            },
            password: "parent123",
        },
        Account {
            user: User {
                id: "u8",
                name: "Mrs. Wilson",
                role: Role::Parent,
                linked_student_id: Some("STU006"),
            },
            password: "parent123",
        },
    ];
    ACCOUNTS
}

/// Check a userId/password pair against the mock table.
/// The same `None` comes back for unknown id and wrong password.
pub fn verify(user_id: &str, password: &str) -> Option<User> {
    accounts()
        .iter()
        .find(|a| a.user.id == user_id && a.password == password)
        .map(|a| a.user.clone())
}
