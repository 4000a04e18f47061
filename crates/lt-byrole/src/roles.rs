// roles.rs — Role-membership lookup for courses.
//
// The evaluator only asks one question: does this course currently have at
// least one member holding any responsible role? `RoleChecker` is that
// question as a trait, so a host can answer it from its own database.
//
// `ContextRoleChecker` is the built-in answer over a `RoleDirectory`
// snapshot (courses, category tree, role assignments per context). Course
// context assignments always count. Parent contexts (the category chain up
// to the root, then the system context) count only when inherited roles are
// enabled, since a site-wide role would otherwise exempt every course.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TriggerError;
use crate::ids::{CategoryId, CourseId, RoleId, RoleSet};

/// Answers whether a course has a responsible person right now.
pub trait RoleChecker: Send + Sync {
    /// `true` if any role in `roles` is assigned in the course's context
    /// (or, with `include_inherited`, in one of its parent contexts).
    fn has_responsible_role(
        &self,
        course_id: CourseId,
        roles: &RoleSet,
        include_inherited: bool,
    ) -> Result<bool, TriggerError>;
}

/// A context in which a role can be assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleContext {
    System,
    Category(CategoryId),
    Course(CourseId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseEntry {
    pub id: CourseId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub id: CategoryId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<CategoryId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub context: RoleContext,
    pub role: RoleId,
}

/// Snapshot of courses, categories and role assignments exported by a host.
///
/// ```json
/// {
///   "courses": [{ "id": 10, "category": 2 }],
///   "categories": [{ "id": 2, "parent": 1 }, { "id": 1 }],
///   "assignments": [{ "context": { "course": 10 }, "role": "student" }]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleDirectory {
    #[serde(default)]
    pub courses: Vec<CourseEntry>,
    #[serde(default)]
    pub categories: Vec<CategoryEntry>,
    #[serde(default)]
    pub assignments: Vec<RoleAssignment>,
}

impl RoleDirectory {
    /// Load a snapshot from a JSON file.
    pub fn load(path: &Path) -> Result<Self, TriggerError> {
        let json = std::fs::read_to_string(path).map_err(|source| TriggerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Course ids in snapshot order.
    pub fn course_ids(&self) -> Vec<CourseId> {
        self.courses.iter().map(|c| c.id).collect()
    }
}

/// `RoleChecker` over an indexed [`RoleDirectory`].
#[derive(Debug, Default)]
pub struct ContextRoleChecker {
    course_category: HashMap<CourseId, Option<CategoryId>>,
    category_parent: HashMap<CategoryId, Option<CategoryId>>,
    assigned: HashMap<RoleContext, BTreeSet<RoleId>>,
}

impl ContextRoleChecker {
    pub fn new(directory: &RoleDirectory) -> Self {
        let mut assigned: HashMap<RoleContext, BTreeSet<RoleId>> = HashMap::new();
        for assignment in &directory.assignments {
            assigned
                .entry(assignment.context)
                .or_default()
                .insert(assignment.role.clone());
        }
        Self {
            course_category: directory
                .courses
                .iter()
                .map(|c| (c.id, c.category))
                .collect(),
            category_parent: directory
                .categories
                .iter()
                .map(|c| (c.id, c.parent))
                .collect(),
            assigned,
        }
    }

    fn context_has_any(&self, context: RoleContext, roles: &RoleSet) -> bool {
        self.assigned
            .get(&context)
            .is_some_and(|assigned| roles.iter().any(|role| assigned.contains(role)))
    }

    /// Categories from `start` up to the root, nearest first.
    ///
    /// Walks parent pointers iteratively. A cycle makes the whole chain
    /// untrustworthy, so it yields an empty chain and a warning. An unknown
    /// category ends the walk where it is.
    pub fn category_chain(&self, start: CategoryId) -> Vec<CategoryId> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(start);

        while let Some(category) = current {
            if !visited.insert(category) {
                tracing::warn!(
                    category = %category,
                    start = %start,
                    "category hierarchy contains a cycle; ignoring inherited role assignments"
                );
                return Vec::new();
            }
            chain.push(category);
            current = match self.category_parent.get(&category) {
                Some(parent) => *parent,
                None => {
                    tracing::warn!(category = %category, "unknown category in hierarchy");
                    None
                }
            };
        }
        chain
    }
}

impl RoleChecker for ContextRoleChecker {
    fn has_responsible_role(
        &self,
        course_id: CourseId,
        roles: &RoleSet,
        include_inherited: bool,
    ) -> Result<bool, TriggerError> {
        if self.context_has_any(RoleContext::Course(course_id), roles) {
            return Ok(true);
        }
        if !include_inherited {
            return Ok(false);
        }

        let category = self.course_category.get(&course_id).copied().flatten();
        if let Some(category) = category {
            let inherited = self
                .category_chain(category)
                .into_iter()
                .any(|c| self.context_has_any(RoleContext::Category(c), roles));
            if inherited {
                return Ok(true);
            }
        }
        Ok(self.context_has_any(RoleContext::System, roles))
    }
}
