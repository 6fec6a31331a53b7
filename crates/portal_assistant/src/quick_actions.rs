//! Canned quick actions and their replies.
//!
//! Quick actions never touch the live channel. Replies are a pure
//! function of the prompt text; the caller applies the "thinking" delay.

use crate::types::Role;

const STUDENT_ACTIONS: &[&str] = &[
    "Show my grades",
    "Check attendance",
    "Upcoming assignments",
    "Fee payment status",
];

const PARENT_ACTIONS: &[&str] = &[
    "Child's progress report",
    "Attendance summary",
    "Upcoming parent-teacher meetings",
    "Fee due dates",
];

const ADMIN_ACTIONS: &[&str] = &[
    "Enrollment statistics",
    "Pending approvals",
    "Staff attendance today",
    "Generate monthly report",
];

/// Maps role-specific canned prompts to templated replies
#[derive(Debug, Clone, Default)]
pub struct QuickActionResponder {}

impl QuickActionResponder {
    pub fn new() -> Self {
        Self {}
    }

    /// Menu of quick actions for a role, in display order.
    ///
    /// Faculty has no menu.
    pub fn actions_for(&self, role: Role) -> Vec<String> {
        let actions: &[&str] = match role {
            Role::Student => STUDENT_ACTIONS,
            Role::Parent => PARENT_ACTIONS,
            Role::Admin => ADMIN_ACTIONS,
            Role::Faculty => &[],
        };
        actions.iter().map(|s| s.to_string()).collect()
    }

    /// Reply for a prompt. Unknown prompts get a generic pointer to the dashboard.
    pub fn respond(&self, prompt: &str) -> String {
        match prompt {
            "Show my grades" => GRADES_REPLY.to_string(),
            "Check attendance" => ATTENDANCE_REPLY.to_string(),
            "Upcoming assignments" => ASSIGNMENTS_REPLY.to_string(),
            "Fee payment status" => FEE_STATUS_REPLY.to_string(),
            "Child's progress report" => PROGRESS_REPLY.to_string(),
            "Attendance summary" => ATTENDANCE_SUMMARY_REPLY.to_string(),
            "Upcoming parent-teacher meetings" => MEETINGS_REPLY.to_string(),
            "Fee due dates" => FEE_DUE_REPLY.to_string(),
            "Enrollment statistics" => ENROLLMENT_REPLY.to_string(),
            "Pending approvals" => APPROVALS_REPLY.to_string(),
            "Staff attendance today" => STAFF_ATTENDANCE_REPLY.to_string(),
            "Generate monthly report" => REPORT_REPLY.to_string(),
            other => format!(
                "I can help with \"{}\". You'll find the details in the matching section of your dashboard, or ask me a more specific question.",
                other
            ),
        }
    }
}

// Student

const GRADES_REPLY: &str = "Here's your current academic standing:

- Mathematics: A (92%)
- Physics: A- (88%)
- English Literature: B+ (85%)
- Computer Science: A (95%)

Overall GPA: 3.8 / 4.0. Open the Grades tab for the full breakdown.";

const ATTENDANCE_REPLY: &str = "Your attendance this semester is 94% (113 of 120 classes).

You're above the 75% minimum in every subject. Lowest: Physics at 89%.";

const ASSIGNMENTS_REPLY: &str = "You have 3 upcoming assignments:

1. Calculus problem set 7 - due Friday
2. Physics lab report - due next Monday
3. Literature essay draft - due next Wednesday";

const FEE_STATUS_REPLY: &str = "Tuition for this semester is paid in full.

The next installment of $1,250 is due on the 15th of next month.";

// Parent

const PROGRESS_REPLY: &str = "Your child is doing well this term:

- Overall GPA: 3.6 / 4.0
- Strongest subject: Computer Science (A)
- Needs attention: Chemistry (C+)

Teachers' comments are available under Progress Reports.";

const ATTENDANCE_SUMMARY_REPLY: &str = "Attendance this month: 19 of 20 school days (95%).

One excused absence was recorded last Tuesday.";

const MEETINGS_REPLY: &str = "Upcoming parent-teacher meetings:

1. Mathematics - Thursday, 4:00 PM
2. Class teacher review - next Tuesday, 5:30 PM

You can reschedule from the Meetings page.";

const FEE_DUE_REPLY: &str = "Next fee installment: $1,250 due on the 15th of next month.

Late payments after the due date incur a $25 fee.";

// Admin

const ENROLLMENT_REPLY: &str = "Current enrollment: 2,480 students.

- New admissions this term: 312
- Withdrawals this term: 27
- Year-over-year growth: 6.4%";

const APPROVALS_REPLY: &str = "You have 7 items awaiting approval:

- 3 leave requests
- 2 course change requests
- 2 purchase orders

Open the Approvals queue to review them.";

const STAFF_ATTENDANCE_REPLY: &str = "Staff attendance today: 142 of 150 present (94.7%).

5 on approved leave, 3 absences not yet reported.";

const REPORT_REPLY: &str = "The monthly report is being prepared.

It will include enrollment, attendance, and fee collection summaries, and will appear under Reports when ready.";
