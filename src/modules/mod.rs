/*
    aeon, planetary system evolution over Gyr timescales
    Copyright (C) 2023-onwards Aeon Contributors

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

/// Atmospheric escape: water photolysis, oxygen buildup and hydrogen
/// envelope erosion under XUV forcing.
pub mod atmesc;
pub use self::atmesc::AtmEsc;

/// Stellar evolution: tabulated tracks, XUV decay, magnetic braking.
pub mod stellar;
pub use self::stellar::Stellar;

/// The tabulated stellar grid behind the stellar module.
pub mod tracks;
